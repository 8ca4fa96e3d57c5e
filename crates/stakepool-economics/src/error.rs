use stakepool_intent::{CoinError, IntentError, Int, MemoError};
use thiserror::Error;

/// Failures raised while splitting a deposit or withdrawal across validators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AllocationError {
    #[error("Expected exactly one coin, got {0}")]
    InvalidCoinCount(usize),
    #[error("Amount must be strictly positive, got {0}")]
    NonPositiveAmount(String),
    #[error("Target allocation is empty")]
    EmptyTarget,
    #[error("Insufficient availability: requested {requested}, available {available}")]
    InsufficientAvailability { requested: Int, available: Int },
    #[error("Allocation invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Intent error: {0}")]
    Intent(#[from] IntentError),
    #[error("Memo error: {0}")]
    Memo(#[from] MemoError),
}

impl From<CoinError> for AllocationError {
    fn from(err: CoinError) -> Self {
        match err {
            CoinError::InvalidCoinCount(count) => AllocationError::InvalidCoinCount(count),
            CoinError::NonPositiveAmount(coin) => AllocationError::NonPositiveAmount(coin),
        }
    }
}
