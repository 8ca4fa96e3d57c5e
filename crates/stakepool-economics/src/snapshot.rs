//! POOL SNAPSHOT
//!
//! Per-validator pool state as read from the ledger for one zone, in the shape
//! the engine plans against.

use crate::rebalance::{RebalanceTarget, RedelegationRecord};
use log::debug;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use stakepool_intent::Int;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Delegated amount per validator.
    pub current: BTreeMap<String, Int>,
    /// Validators that are the destination of an in-flight redelegation.
    pub locked: BTreeMap<String, bool>,
    /// Stake each validator can release right now.
    pub available: BTreeMap<String, Int>,
    pub redelegations: Vec<RedelegationRecord>,
}

impl PoolSnapshot {
    pub fn total(&self) -> Int {
        self.current.values().sum()
    }

    pub fn total_locked(&self) -> Int {
        self.redelegations.iter().map(|r| &r.amount).sum()
    }

    /// Apply a planned set of redelegations to the snapshot.
    pub fn apply_plan(&mut self, plan: &[RebalanceTarget]) {
        for step in plan {
            if let Some(source) = self.current.get_mut(&step.source) {
                *source -= &step.amount;
            }
            *self.current.entry(step.target.clone()).or_insert_with(Int::zero) += &step.amount;
            debug!("applied redelegation {} -> {} of {}", step.source, step.target, step.amount);
        }
    }
}
