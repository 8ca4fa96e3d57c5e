use crate::math::Int;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single denomination amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: Int,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: impl Into<Int>) -> Self {
        Coin {
            denom: denom.into(),
            amount: amount.into(),
        }
    }

    pub fn is_positive(&self) -> bool {
        self.amount.is_positive()
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Bundle of coins, as carried by a deposit or withdrawal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coins(pub Vec<Coin>);

impl Coins {
    pub fn new(coins: Vec<Coin>) -> Self {
        Coins(coins)
    }

    pub fn single(denom: impl Into<String>, amount: impl Into<Int>) -> Self {
        Coins(vec![Coin::new(denom, amount)])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Coin> {
        self.0.iter()
    }

    /// Total amount held in `denom` (zero when absent).
    pub fn amount_of(&self, denom: &str) -> Int {
        self.0
            .iter()
            .filter(|coin| coin.denom == denom)
            .fold(Int::zero(), |acc, coin| acc + &coin.amount)
    }

    /// The one and only coin, which must carry a strictly positive amount.
    pub fn single_positive(&self) -> Result<&Coin, CoinError> {
        if self.0.len() != 1 {
            return Err(CoinError::InvalidCoinCount(self.0.len()));
        }
        let coin = &self.0[0];
        if !coin.is_positive() {
            return Err(CoinError::NonPositiveAmount(coin.to_string()));
        }
        Ok(coin)
    }
}

impl<'a> IntoIterator for &'a Coins {
    type Item = &'a Coin;
    type IntoIter = std::slice::Iter<'a, Coin>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoinError {
    #[error("Expected exactly one coin, got {0}")]
    InvalidCoinCount(usize),
    #[error("Amount must be strictly positive, got {0}")]
    NonPositiveAmount(String),
}
