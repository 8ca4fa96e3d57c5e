//! REBALANCER
//!
//! Plans redelegations that move the pool toward its target weights while
//! bounding how much stake may move in one pass. Validators already receiving
//! an in-flight redelegation are locked and cannot act as sources.

use crate::config::RebalanceParams;
use crate::deltas::calculate_deltas;
use log::{debug, info, warn};
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use stakepool_intent::math::{max_int, min_int};
use stakepool_intent::{truncate, Int, ValidatorIntents};
use std::collections::BTreeMap;

/// One planned redelegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceTarget {
    pub source: String,
    pub target: String,
    pub amount: Int,
}

/// A redelegation that is still in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedelegationRecord {
    pub source: String,
    pub destination: String,
    pub amount: Int,
    pub epoch_number: i64,
}

impl RedelegationRecord {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        amount: impl Into<Int>,
        epoch_number: i64,
    ) -> Self {
        RedelegationRecord {
            source: source.into(),
            destination: destination.into(),
            amount: amount.into(),
            epoch_number,
        }
    }
}

/// Per-pass movement cap: `min((total − locked) / unlocked_divisor, total / total_divisor)`.
pub fn max_movable(current_sum: &Int, total_locked: &Int, params: &RebalanceParams) -> Int {
    let unlocked_cap = (current_sum - total_locked) / Int::from(params.unlocked_divisor);
    let total_cap = current_sum / Int::from(params.total_divisor);
    min_int(&unlocked_cap, &total_cap)
}

/// Stake on each validator that may not be moved this pass.
///
/// Redelegation destinations accumulate the in-flight amounts; a validator
/// flagged in `locked` has its whole current allocation locked.
pub fn locked_amounts(
    current: &BTreeMap<String, Int>,
    locked: &BTreeMap<String, bool>,
    existing_redelegations: &[RedelegationRecord],
) -> BTreeMap<String, Int> {
    let mut out: BTreeMap<String, Int> = BTreeMap::new();
    for record in existing_redelegations {
        *out.entry(record.destination.clone()).or_insert_with(Int::zero) += &record.amount;
    }
    for (id, is_locked) in locked {
        if *is_locked {
            out.insert(id.clone(), current.get(id).cloned().unwrap_or_else(Int::zero));
        }
    }
    out
}

pub fn rebalance(
    current: &BTreeMap<String, Int>,
    locked: &BTreeMap<String, bool>,
    current_sum: &Int,
    locked_sum: &Int,
    target: &ValidatorIntents,
    existing_redelegations: &[RedelegationRecord],
    params: &RebalanceParams,
) -> Vec<RebalanceTarget> {
    let deltas = calculate_deltas(current, current_sum, target);

    let total_locked: Int = existing_redelegations.iter().map(|r| &r.amount).sum();
    let locked_by_validator = locked_amounts(current, locked, existing_redelegations);
    let cap = max_movable(current_sum, &total_locked, params);

    // Front of the delta list wants stake, back of it gives stake.
    let mut receivers: Vec<(String, Int)> = Vec::new();
    let mut givers: Vec<(String, Int)> = Vec::new();
    for delta in deltas.iter() {
        if delta.weight.is_positive() {
            receivers.push((delta.validator_id.clone(), truncate(&delta.weight)));
        } else if delta.weight.is_negative() {
            let held = current.get(&delta.validator_id).cloned().unwrap_or_else(Int::zero);
            let frozen = locked_by_validator
                .get(&delta.validator_id)
                .cloned()
                .unwrap_or_else(Int::zero);
            let movable = max_int(&(held - frozen), &Int::zero());
            givers.push((delta.validator_id.clone(), min_int(&truncate(&-&delta.weight), &movable)));
        }
    }
    givers.reverse();
    receivers.retain(|(_, amount)| amount.is_positive());
    givers.retain(|(_, amount)| amount.is_positive());

    let want: Int = receivers.iter().map(|(_, amount)| amount).sum();
    let can_give: Int = givers.iter().map(|(_, amount)| amount).sum();
    let mut to_move = min_int(&min_int(&want, &can_give), &cap);

    debug!(
        "rebalance budget: total {}, locked {} ({} in flight), want {}, can give {}, cap {}",
        current_sum, locked_sum, total_locked, want, can_give, cap
    );

    let mut out: Vec<RebalanceTarget> = Vec::new();
    if !to_move.is_positive() {
        return out;
    }

    let (mut tgt_idx, mut src_idx) = (0usize, 0usize);
    let mut iterations = 0u32;
    while to_move.is_positive() && tgt_idx < receivers.len() && src_idx < givers.len() {
        if iterations >= params.max_iterations {
            warn!(
                "rebalance stopped after {} iterations with {} left to move",
                iterations, to_move
            );
            break;
        }
        iterations += 1;

        let amount = min_int(&min_int(&givers[src_idx].1, &receivers[tgt_idx].1), &to_move);
        out.push(RebalanceTarget {
            source: givers[src_idx].0.clone(),
            target: receivers[tgt_idx].0.clone(),
            amount: amount.clone(),
        });
        givers[src_idx].1 -= &amount;
        receivers[tgt_idx].1 -= &amount;
        to_move -= &amount;

        if givers[src_idx].1.is_zero() {
            src_idx += 1;
        }
        if receivers[tgt_idx].1.is_zero() {
            tgt_idx += 1;
        }
    }

    out.sort_by(|a, b| {
        a.source
            .cmp(&b.source)
            .then_with(|| a.target.cmp(&b.target))
            .then_with(|| b.amount.cmp(&a.amount))
    });

    info!("planned {} redelegations", out.len());
    out
}
