//! STAKEPOOL INTENT LAYER
//!
//! Data model shared by the allocation engine:
//! - Exact arithmetic (`Int` / `Dec`) with truncating conversions
//! - Coins carried by deposits and withdrawals
//! - Validator intents, ordinalization and aggregation
//! - The zone descriptor supplied by the surrounding chain module
//! - The binary memo protocol depositors use to signal intent

pub mod math;
pub mod coin;
pub mod intent;
pub mod zone;
pub mod memo;

// Re-export key types for easy access
pub use math::{dec, dec_from_int, int, parse_dec, truncate, Dec, Int, MathError};

pub use coin::{Coin, CoinError, Coins};

pub use intent::{aggregate_intents, DelegatorIntent, IntentError, ValidatorIntent, ValidatorIntents};

pub use zone::{AddressCodec, AddressError, Bech32Codec, Zone};

pub use memo::{
    decode_memo, decode_memo_as, decode_memo_base64, encode_memo_base64, encode_weighted_addresses,
    MemoError, MemoField, MemoFieldId, MemoFields, MemoFormat,
};
