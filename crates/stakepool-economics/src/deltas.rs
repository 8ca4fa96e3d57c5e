//! ALLOCATION DELTAS
//!
//! Signed distance between where stake sits and where the target intent wants it.
//! The result reuses `ValidatorIntents`, with `weight` holding the delta:
//! positive means under-allocated, negative means over-allocated.

use itertools::Itertools;
use num_traits::Zero;
use stakepool_intent::{dec_from_int, Dec, Int, ValidatorIntent, ValidatorIntents};
use std::collections::BTreeMap;

/// `current_sum × target_weight − current[id]` for every id in `current ∪ target`,
/// highest delta first, ties broken by descending id.
pub fn calculate_deltas(
    current: &BTreeMap<String, Int>,
    current_sum: &Int,
    target: &ValidatorIntents,
) -> ValidatorIntents {
    let total = dec_from_int(current_sum);

    let mut deltas: Vec<ValidatorIntent> = current
        .keys()
        .cloned()
        .chain(target.keys())
        .unique()
        .map(|id| {
            let held = current.get(&id).map(dec_from_int).unwrap_or_else(Dec::zero);
            let delta = target.weight_of(&id) * &total - held;
            ValidatorIntent::new(id, delta)
        })
        .collect();

    // Stable passes: id descending first, then delta descending on top of it.
    deltas.sort_by(|a, b| b.validator_id.cmp(&a.validator_id));
    deltas.sort_by(|a, b| b.weight.cmp(&a.weight));

    ValidatorIntents::from(deltas)
}

/// Largest delta, `None` for an empty set.
pub fn max_delta(deltas: &ValidatorIntents) -> Option<Dec> {
    deltas.iter().map(|d| d.weight.clone()).max()
}

/// Smallest delta, `None` for an empty set.
pub fn min_delta(deltas: &ValidatorIntents) -> Option<Dec> {
    deltas.iter().map(|d| d.weight.clone()).min()
}
