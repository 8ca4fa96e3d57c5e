//! STAKEPOOL ALLOCATION ENGINE
//!
//! Decides where pooled stake goes on the remote chain:
//! - Deposits are split toward the target weights
//! - Deltas measure how far each validator is from target
//! - Rebalancing moves stake between validators under a per-pass cap
//! - Withdrawals drain over-allocated validators first
//!
//! Every function is pure; callers own persistence and scheduling.

pub mod config;
pub mod error;
pub mod delegation;
pub mod deltas;
pub mod rebalance;
pub mod snapshot;
pub mod undelegation;

// Re-export key types for easy access
pub use crate::config::{ConfigError, EngineConfig, RebalanceParams};

pub use error::AllocationError;

pub use delegation::allocate_delegation;

pub use deltas::{calculate_deltas, max_delta, min_delta};

pub use rebalance::{rebalance, RebalanceTarget, RedelegationRecord};

pub use snapshot::PoolSnapshot;

pub use undelegation::allocate_undelegation;

/// Engine facade (binds configuration to the allocation algorithms)
pub mod integration {
    use crate::*;
    use log::{debug, info};
    use serde::{Deserialize, Serialize};
    use stakepool_intent::{
        aggregate_intents, decode_memo_base64, dec_from_int, Coins, DelegatorIntent, Int, IntentError,
        MemoError, ValidatorIntents, Zone,
    };
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AllocationEngine {
        config: EngineConfig,
    }

    impl AllocationEngine {
        /// Build an engine from a validated configuration.
        pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
            config.validate()?;
            Ok(AllocationEngine { config })
        }

        pub fn config(&self) -> &EngineConfig {
            &self.config
        }

        pub fn delegate(
            &self,
            current: &BTreeMap<String, Int>,
            current_sum: &Int,
            target: &ValidatorIntents,
            amount: &Coins,
        ) -> Result<BTreeMap<String, Int>, EngineError> {
            Ok(allocate_delegation(current, current_sum, target, amount)?)
        }

        pub fn deltas(
            &self,
            current: &BTreeMap<String, Int>,
            current_sum: &Int,
            target: &ValidatorIntents,
        ) -> ValidatorIntents {
            calculate_deltas(current, current_sum, target)
        }

        pub fn rebalance(
            &self,
            current: &BTreeMap<String, Int>,
            locked: &BTreeMap<String, bool>,
            current_sum: &Int,
            locked_sum: &Int,
            target: &ValidatorIntents,
            existing_redelegations: &[RedelegationRecord],
        ) -> Vec<RebalanceTarget> {
            rebalance::rebalance(
                current,
                locked,
                current_sum,
                locked_sum,
                target,
                existing_redelegations,
                &self.config.rebalance,
            )
        }

        pub fn undelegate(
            &self,
            current: &BTreeMap<String, Int>,
            locked: &BTreeMap<String, bool>,
            current_sum: &Int,
            target: &ValidatorIntents,
            available: &BTreeMap<String, Int>,
            amount: &Coins,
        ) -> Result<BTreeMap<String, Int>, EngineError> {
            Ok(allocate_undelegation(current, locked, current_sum, target, available, amount)?)
        }

        /// Pool-wide target: every depositor's intent weighted by balance, or an
        /// equal split over the zone's validators when nobody has signalled one.
        pub fn target_for_zone(
            &self,
            zone: &Zone,
            delegators: &[(DelegatorIntent, Int)],
        ) -> Result<ValidatorIntents, EngineError> {
            let aggregate = aggregate_intents(delegators)?;
            Ok(zone.aggregate_intent_or_default(&aggregate))
        }

        /// Fold a deposit into the depositor's intent.
        ///
        /// A staking intent carried in the memo wins; otherwise token-share coins
        /// in the deposit are used. `balance` is the depositor's balance before
        /// the deposit.
        pub fn apply_deposit_intent(
            &self,
            zone: &Zone,
            intent: &DelegatorIntent,
            balance: &Int,
            coins: &Coins,
            memo: &str,
        ) -> Result<DelegatorIntent, EngineError> {
            zone.validate_coins_for_zone(coins)?;
            let multiplier = dec_from_int(balance);
            let fields = decode_memo_base64(memo)?;

            let (memo_intent, found) = fields.intent(coins, zone);
            let updated = if found {
                debug!("applying memo intent for {}", intent.delegator);
                intent.add_ordinal(&multiplier, &memo_intent)
            } else {
                zone.update_intent_with_coins(intent, &multiplier, coins)
            };
            info!("intent for {} is now {}", updated.delegator, updated.intents);
            Ok(updated)
        }
    }

    #[derive(Debug, thiserror::Error, Clone, PartialEq)]
    pub enum EngineError {
        #[error("Configuration error: {0}")]
        Config(#[from] crate::config::ConfigError),
        #[error("Allocation error: {0}")]
        Allocation(#[from] crate::error::AllocationError),
        #[error("Intent error: {0}")]
        Intent(#[from] IntentError),
        #[error("Memo error: {0}")]
        Memo(#[from] MemoError),
    }
}
