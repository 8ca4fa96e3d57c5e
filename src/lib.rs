//! STAKEPOOL
//!
//! Allocation engine for a liquid-staking pool. The workspace is split by concern:
//! - `stakepool-intent`: arithmetic, coins, validator intents, zones and the memo codec
//! - `stakepool-economics`: delegation, deltas, rebalancing and withdrawal planning
//!
//! This crate re-exports both so the surrounding chain module has one import.

pub use stakepool_economics as economics;
pub use stakepool_intent as intent;

pub use stakepool_economics::integration::{AllocationEngine, EngineError};
pub use stakepool_economics::{
    AllocationError, EngineConfig, PoolSnapshot, RebalanceParams, RebalanceTarget, RedelegationRecord,
};
pub use stakepool_intent::{
    Coin, Coins, Dec, DelegatorIntent, Int, MemoError, MemoFields, ValidatorIntent, ValidatorIntents, Zone,
};
