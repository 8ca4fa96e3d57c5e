//! ZONE DESCRIPTOR
//!
//! Read-only view of a remote chain supplied by the caller: its validator set,
//! address prefix and base denomination. Raw address bytes found in memos are
//! re-encoded through an [`AddressCodec`]; the default is bech32 under the
//! zone's validator prefix.

use crate::coin::Coins;
use crate::intent::{DelegatorIntent, IntentError, ValidatorIntent, ValidatorIntents};
use crate::math::{dec, dec_from_int, Dec};
use crate::memo::{self, MemoError, MemoFields};
use bech32::{FromBase32, ToBase32, Variant};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Converts between raw address bytes and their textual form on a chain.
pub trait AddressCodec {
    fn encode(&self, raw: &[u8]) -> Result<String, AddressError>;
    fn decode(&self, address: &str) -> Result<Vec<u8>, AddressError>;
}

/// Bech32 addresses under a fixed human-readable prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bech32Codec {
    hrp: String,
}

impl Bech32Codec {
    pub fn new(hrp: impl Into<String>) -> Self {
        Bech32Codec { hrp: hrp.into() }
    }

    pub fn hrp(&self) -> &str {
        &self.hrp
    }
}

impl AddressCodec for Bech32Codec {
    fn encode(&self, raw: &[u8]) -> Result<String, AddressError> {
        bech32::encode(&self.hrp, raw.to_base32(), Variant::Bech32)
            .map_err(|e| AddressError::Encode(e.to_string()))
    }

    fn decode(&self, address: &str) -> Result<Vec<u8>, AddressError> {
        let (hrp, data, _variant) =
            bech32::decode(address).map_err(|e| AddressError::Decode(e.to_string()))?;
        if hrp != self.hrp {
            return Err(AddressError::PrefixMismatch {
                expected: self.hrp.clone(),
                found: hrp,
            });
        }
        Vec::<u8>::from_base32(&data).map_err(|e| AddressError::Decode(e.to_string()))
    }
}

/// Remote chain metadata consumed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub chain_id: String,
    /// Account address prefix, e.g. `cosmos`.
    pub account_prefix: String,
    /// Staking denomination, e.g. `uatom`.
    pub base_denom: String,
    /// Validator ids of the active set.
    pub validators: Vec<String>,
}

impl Zone {
    pub fn new(
        chain_id: impl Into<String>,
        account_prefix: impl Into<String>,
        base_denom: impl Into<String>,
        validators: Vec<String>,
    ) -> Self {
        Zone {
            chain_id: chain_id.into(),
            account_prefix: account_prefix.into(),
            base_denom: base_denom.into(),
            validators,
        }
    }

    pub fn valoper_prefix(&self) -> String {
        format!("{}valoper", self.account_prefix)
    }

    pub fn validator_codec(&self) -> Bech32Codec {
        Bech32Codec::new(self.valoper_prefix())
    }

    pub fn is_validator(&self, validator_id: &str) -> bool {
        self.validators.iter().any(|v| v == validator_id)
    }

    /// Every coin must be the base denom or a token share of a known validator.
    pub fn validate_coins_for_zone(&self, coins: &Coins) -> Result<(), IntentError> {
        for coin in coins {
            if coin.denom == self.base_denom {
                continue;
            }
            if !self.validators.iter().any(|v| coin.denom.starts_with(v.as_str())) {
                return Err(IntentError::InvalidDenom(coin.denom.clone()));
            }
        }
        Ok(())
    }

    /// Token-share deposits: a coin whose denom starts with a validator id adds
    /// its amount to that validator's ordinal weight.
    pub fn convert_coins_to_ordinal_intents(&self, coins: &Coins) -> ValidatorIntents {
        let mut out = ValidatorIntents::new();
        for coin in coins {
            if let Some(validator) = self.validators.iter().find(|v| coin.denom.starts_with(v.as_str())) {
                out.add_weight(validator, &dec_from_int(&coin.amount));
            }
        }
        out
    }

    /// Ordinal weights from a weighted-address blob, re-encoded with this zone's codec.
    pub fn convert_memo_to_ordinal_intents(
        &self,
        coins: &Coins,
        weighted_addresses: &[u8],
    ) -> Result<ValidatorIntents, MemoError> {
        memo::ordinal_intents_from_weighted_addresses(
            weighted_addresses,
            &coins.amount_of(&self.base_denom),
            &self.validator_codec(),
        )
    }

    pub fn update_intent_with_coins(
        &self,
        intent: &DelegatorIntent,
        multiplier: &Dec,
        coins: &Coins,
    ) -> DelegatorIntent {
        intent.add_ordinal(multiplier, &self.convert_coins_to_ordinal_intents(coins))
    }

    /// Apply a decoded memo's staking intent; memos without one leave the intent as is.
    pub fn update_intent_with_memo(
        &self,
        intent: &DelegatorIntent,
        fields: &MemoFields,
        multiplier: &Dec,
        coins: &Coins,
    ) -> DelegatorIntent {
        let (memo_intent, found) = fields.intent(coins, self);
        if !found {
            return intent.clone();
        }
        intent.add_ordinal(multiplier, &memo_intent)
    }

    /// The aggregate when one exists, else an equal split across the validator set.
    pub fn aggregate_intent_or_default(&self, aggregate: &ValidatorIntents) -> ValidatorIntents {
        if !aggregate.is_empty() {
            return aggregate.clone();
        }
        if self.validators.is_empty() {
            warn!("zone {} has no validators, no default intent available", self.chain_id);
            return ValidatorIntents::new();
        }
        let each = dec(1) / dec(self.validators.len() as i64);
        self.validators
            .iter()
            .map(|v| ValidatorIntent::new(v.clone(), each.clone()))
            .collect::<ValidatorIntents>()
            .sorted()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AddressError {
    #[error("Unable to encode address: {0}")]
    Encode(String),
    #[error("Unable to decode address: {0}")]
    Decode(String),
    #[error("Address prefix mismatch: expected {expected}, found {found}")]
    PrefixMismatch { expected: String, found: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::Coin;
    use crate::math::{int, parse_dec};

    fn zone() -> Zone {
        let codec = Bech32Codec::new("cosmosvaloper");
        let validators = (1u8..=3)
            .map(|n| codec.encode(&[n; 20]).unwrap())
            .collect();
        Zone::new("cosmoshub-4", "cosmos", "uatom", validators)
    }

    #[test]
    fn test_bech32_round_trip() {
        let codec = Bech32Codec::new("cosmosvaloper");
        let raw = [7u8; 20];
        let encoded = codec.encode(&raw).unwrap();
        assert!(encoded.starts_with("cosmosvaloper1"));
        assert_eq!(codec.decode(&encoded).unwrap(), raw.to_vec());
    }

    #[test]
    fn test_bech32_prefix_mismatch() {
        let encoded = Bech32Codec::new("osmovaloper").encode(&[1u8; 20]).unwrap();
        assert!(matches!(
            Bech32Codec::new("cosmosvaloper").decode(&encoded),
            Err(AddressError::PrefixMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_coins_for_zone() {
        let zone = zone();
        let share = format!("{}/42", zone.validators[0]);
        assert!(zone
            .validate_coins_for_zone(&Coins::new(vec![Coin::new("uatom", 5), Coin::new(share, 7)]))
            .is_ok());
        assert_eq!(
            zone.validate_coins_for_zone(&Coins::single("uosmo", 5)),
            Err(IntentError::InvalidDenom("uosmo".to_string()))
        );
    }

    #[test]
    fn test_convert_coins_to_ordinal_intents() {
        let zone = zone();
        let coins = Coins::new(vec![
            Coin::new(format!("{}/1", zone.validators[0]), 100),
            Coin::new(format!("{}/2", zone.validators[0]), 50),
            Coin::new(format!("{}/9", zone.validators[2]), 25),
            Coin::new("uatom", 1000),
        ]);
        let out = zone.convert_coins_to_ordinal_intents(&coins);
        assert_eq!(out.len(), 2);
        assert_eq!(out.weight_of(&zone.validators[0]), dec(150));
        assert_eq!(out.weight_of(&zone.validators[2]), dec(25));
    }

    #[test]
    fn test_update_intent_with_coins() {
        let zone = zone();
        let intent = DelegatorIntent::new("user", ValidatorIntents::new());
        let coins = Coins::single(format!("{}/1", zone.validators[1]), int(10));
        let updated = zone.update_intent_with_coins(&intent, &dec(0), &coins);
        assert_eq!(updated.intents.weight_of(&zone.validators[1]), dec(1));
    }

    #[test]
    fn test_aggregate_intent_or_default() {
        let zone = zone();
        let default = zone.aggregate_intent_or_default(&ValidatorIntents::new());
        assert_eq!(default.len(), 3);
        assert_eq!(default.sum(), dec(1));

        let explicit: ValidatorIntents =
            vec![ValidatorIntent::new(zone.validators[0].clone(), parse_dec("1").unwrap())].into();
        assert_eq!(zone.aggregate_intent_or_default(&explicit), explicit);
    }
}
