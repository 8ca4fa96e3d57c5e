//! UNDELEGATION ALLOCATOR
//!
//! Splits a withdrawal across validators while keeping the remaining stake as
//! close to target as possible. Over-allocated validators are drained first,
//! then the remainder is spread to equalize deltas, then proportionally to the
//! target weights. Every share is clamped to what the validator can release.

use crate::deltas::{calculate_deltas, max_delta};
use crate::error::AllocationError;
use log::{debug, info};
use num_traits::{Signed, Zero};
use stakepool_intent::math::{min_int, mul_div_trunc};
use stakepool_intent::{dec_from_int, truncate, Coins, Int, ValidatorIntents};
use std::collections::BTreeMap;

/// Running state shared by the allocation phases.
struct Withdrawal {
    requested: Int,
    available: BTreeMap<String, Int>,
    out: BTreeMap<String, Int>,
    allocated: Int,
}

impl Withdrawal {
    fn new(requested: Int, available: &BTreeMap<String, Int>) -> Self {
        let available = available
            .iter()
            .map(|(id, amount)| (id.clone(), if amount.is_negative() { Int::zero() } else { amount.clone() }))
            .collect();
        Withdrawal {
            requested,
            available,
            out: BTreeMap::new(),
            allocated: Int::zero(),
        }
    }

    fn available_for(&self, id: &str) -> Int {
        self.available.get(id).cloned().unwrap_or_else(Int::zero)
    }

    fn remaining(&self) -> Int {
        &self.requested - &self.allocated
    }

    /// Take up to `share` from `id`, bounded by its availability and by what is
    /// still unallocated. Returns what was taken.
    fn take(&mut self, id: &str, share: &Int) -> Int {
        let taken = min_int(&min_int(share, &self.available_for(id)), &self.remaining());
        if !taken.is_positive() {
            return Int::zero();
        }
        if let Some(left) = self.available.get_mut(id) {
            *left -= &taken;
        }
        *self.out.entry(id.to_string()).or_insert_with(Int::zero) += &taken;
        self.allocated += &taken;
        taken
    }

    fn check(&self, phase: &str) -> Result<(), AllocationError> {
        if self.allocated > self.requested {
            return Err(AllocationError::InvariantViolation(format!(
                "{}: allocated {} exceeds requested {}",
                phase, self.allocated, self.requested
            )));
        }
        Ok(())
    }

    fn finish(mut self) -> BTreeMap<String, Int> {
        self.out.retain(|_, amount| !amount.is_zero());
        self.out
    }
}

pub fn allocate_undelegation(
    current: &BTreeMap<String, Int>,
    locked: &BTreeMap<String, bool>,
    current_sum: &Int,
    target: &ValidatorIntents,
    available: &BTreeMap<String, Int>,
    amount: &Coins,
) -> Result<BTreeMap<String, Int>, AllocationError> {
    let coin = amount.single_positive()?;
    let mut state = Withdrawal::new(coin.amount.clone(), available);

    let total_available: Int = state.available.values().sum();
    if total_available < state.requested {
        return Err(AllocationError::InsufficientAvailability {
            requested: state.requested.clone(),
            available: total_available,
        });
    }

    let mut deltas = calculate_deltas(current, &(current_sum - &state.requested), target);

    drain_over_allocated(&mut state, &mut deltas, locked)?;
    if state.remaining().is_zero() {
        info!("withdrawal of {} served from over-allocated validators", coin);
        return Ok(state.finish());
    }

    equalize(&mut state, &mut deltas)?;
    if state.remaining().is_positive() {
        top_up(&mut state, target)?;
    }
    assign_dust(&mut state, &deltas)?;

    if state.allocated != state.requested {
        return Err(AllocationError::InvariantViolation(format!(
            "allocated {} of requested {}",
            state.allocated, state.requested
        )));
    }
    info!("allocated withdrawal of {} across {} validators", coin, state.out.len());
    Ok(state.finish())
}

/// Withdraw from validators above target, proportional to their excess.
fn drain_over_allocated(
    state: &mut Withdrawal,
    deltas: &mut ValidatorIntents,
    locked: &BTreeMap<String, bool>,
) -> Result<(), AllocationError> {
    let is_locked = |id: &str| locked.get(id).copied().unwrap_or(false);

    let excess: Vec<(String, Int)> = deltas
        .iter()
        .filter(|d| d.weight.is_negative() && !is_locked(d.validator_id.as_str()))
        .map(|d| (d.validator_id.clone(), truncate(&-&d.weight)))
        .collect();
    let excess_sum: Int = excess.iter().map(|(_, e)| e).sum();
    let split = min_int(&excess_sum, &state.requested);
    if !split.is_positive() {
        return Ok(());
    }

    debug!("draining {} from {} over-allocated validators", split, excess.len());
    for (id, over) in &excess {
        let taken = state.take(id, &mul_div_trunc(over, &split, &excess_sum));
        if let Some(delta) = deltas.get_mut(id) {
            delta.weight += dec_from_int(&taken);
        }
    }
    state.check("drain")
}

/// Shift every delta so the most under-allocated sits at zero, then withdraw
/// proportionally to the shifted distance.
fn equalize(state: &mut Withdrawal, deltas: &mut ValidatorIntents) -> Result<(), AllocationError> {
    let top = match max_delta(deltas) {
        Some(top) => top,
        None => return Ok(()),
    };
    // Whole units only, so the shares can never sum past `split`.
    let shifted: Vec<(String, Int)> = deltas
        .iter()
        .map(|d| (d.validator_id.clone(), truncate(&(&top - &d.weight))))
        .collect();
    let shifted_sum: Int = shifted.iter().map(|(_, s)| s).sum();
    let split = min_int(&shifted_sum, &state.remaining());
    if !split.is_positive() {
        return Ok(());
    }

    debug!("equalizing {} across {} validators", split, shifted.len());
    for (id, distance) in &shifted {
        let share = mul_div_trunc(distance, &split, &shifted_sum);
        let taken = state.take(id, &share);
        if let Some(delta) = deltas.get_mut(id) {
            delta.weight += dec_from_int(&taken);
        }
    }
    state.check("equalize")
}

/// Split what is left by target weight over validators that can still release stake.
fn top_up(state: &mut Withdrawal, target: &ValidatorIntents) -> Result<(), AllocationError> {
    let eligible: ValidatorIntents = target
        .iter()
        .filter(|t| t.weight.is_positive() && state.available_for(&t.validator_id).is_positive())
        .cloned()
        .collect();
    if eligible.is_empty() {
        return Ok(());
    }

    let weights = eligible.normalize();
    let remaining = dec_from_int(&state.remaining());
    debug!("topping up {} across {} target validators", remaining, weights.len());
    for intent in weights.iter() {
        let share = truncate(&(&intent.weight * &remaining));
        state.take(&intent.validator_id, &share);
    }
    state.check("top-up")
}

/// Hand the truncation remainder to the first validator able to absorb all of
/// it, or spread it greedily when none can.
fn assign_dust(state: &mut Withdrawal, deltas: &ValidatorIntents) -> Result<(), AllocationError> {
    let dust = state.remaining();
    if dust.is_negative() {
        return Err(AllocationError::InvariantViolation(format!(
            "negative remainder {} before dust",
            dust
        )));
    }
    if dust.is_zero() {
        return Ok(());
    }

    let mut order = deltas.keys();
    order.extend(state.available.keys().filter(|id| deltas.get(id).is_none()).cloned());

    if let Some(id) = order.iter().find(|id| state.available_for(id) >= dust) {
        debug!("assigning withdrawal dust {} to {}", dust, id);
        state.take(id, &dust);
        return state.check("dust");
    }

    for id in &order {
        let left = state.remaining();
        if !left.is_positive() {
            break;
        }
        state.take(id, &left);
    }
    state.check("dust")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakepool_intent::{int, parse_dec, Dec, ValidatorIntent};

    fn allocations(entries: &[(&str, i64)]) -> BTreeMap<String, Int> {
        entries.iter().map(|(id, v)| (id.to_string(), int(*v))).collect()
    }

    fn intents(entries: &[(&str, &str)]) -> ValidatorIntents {
        entries
            .iter()
            .map(|(id, w)| ValidatorIntent::new(*id, parse_dec(w).unwrap()))
            .collect()
    }

    fn uatom(amount: i64) -> Coins {
        Coins::single("uatom", int(amount))
    }

    #[test]
    fn test_undelegation_over_allocated_first() {
        let current = allocations(&[("a", 1000), ("b", 1000)]);
        let target = intents(&[("a", "0.25"), ("b", "0.75")]);
        let out = allocate_undelegation(&current, &BTreeMap::new(), &int(2000), &target, &current, &uatom(300))
            .unwrap();
        assert_eq!(out, allocations(&[("a", 300)]));
    }

    #[test]
    fn test_undelegation_equal_split() {
        let current = allocations(&[("a", 1000), ("b", 1000), ("c", 1000), ("d", 1000)]);
        let target = intents(&[("a", "0.25"), ("b", "0.25"), ("c", "0.25"), ("d", "0.25")]);
        let out = allocate_undelegation(&current, &BTreeMap::new(), &int(4000), &target, &current, &uatom(1000))
            .unwrap();
        assert_eq!(out, allocations(&[("a", 250), ("b", 250), ("c", 250), ("d", 250)]));
    }

    #[test]
    fn test_undelegation_respects_availability() {
        let current = allocations(&[("a", 1000), ("b", 1000)]);
        let target = intents(&[("a", "0.25"), ("b", "0.75")]);
        let available = allocations(&[("a", 100), ("b", 1000)]);
        let out = allocate_undelegation(&current, &BTreeMap::new(), &int(2000), &target, &available, &uatom(300))
            .unwrap();
        assert_eq!(out.get("a"), Some(&int(100)));
        assert_eq!(out.get("b"), Some(&int(200)));
    }

    #[test]
    fn test_undelegation_locked_not_drained_first() {
        let current = allocations(&[("a", 1000), ("b", 1000)]);
        let target = intents(&[("a", "0.25"), ("b", "0.75")]);
        let locked: BTreeMap<String, bool> = [("a".to_string(), true)].into_iter().collect();
        let out = allocate_undelegation(&current, &locked, &int(2000), &target, &current, &uatom(300)).unwrap();
        assert_eq!(out.values().sum::<Int>(), int(300));
        // Without the drain phase the equalize phase still favours the over-allocated validator.
        assert!(out.get("a").cloned().unwrap_or_default() > out.get("b").cloned().unwrap_or_default());
    }

    #[test]
    fn test_undelegation_equalize_fractional_distances() {
        // Drain finds no unlocked excess, so equalize carries the withdrawal over
        // distances of 13.79 and 2.79 whose fractions must not add a unit.
        let current = allocations(&[("a", 9), ("b", 16), ("c", 5)]);
        let target: ValidatorIntents = vec![
            ValidatorIntent::new("a", Dec::new(int(4), int(7))),
            ValidatorIntent::new("b", Dec::new(int(3), int(14))),
            ValidatorIntent::new("c", Dec::new(int(3), int(14))),
        ]
        .into();
        let locked: BTreeMap<String, bool> = [("b".to_string(), true)].into_iter().collect();
        let out = allocate_undelegation(&current, &locked, &int(30), &target, &current, &uatom(11)).unwrap();
        assert_eq!(out.values().sum::<Int>(), int(11));
        assert_eq!(out, allocations(&[("a", 1), ("b", 9), ("c", 1)]));
    }

    #[test]
    fn test_undelegation_withdraws_everything() {
        let current = allocations(&[("a", 600), ("b", 400)]);
        let target = intents(&[("a", "0.5"), ("b", "0.5")]);
        let out = allocate_undelegation(&current, &BTreeMap::new(), &int(1000), &target, &current, &uatom(1000))
            .unwrap();
        assert_eq!(out, current);
    }

    #[test]
    fn test_undelegation_conserves_with_dust() {
        let current = allocations(&[("a", 333), ("b", 333), ("c", 334)]);
        let target = intents(&[("a", "0.3"), ("b", "0.3"), ("c", "0.4")]);
        let out = allocate_undelegation(&current, &BTreeMap::new(), &int(1000), &target, &current, &uatom(101))
            .unwrap();
        assert_eq!(out.values().sum::<Int>(), int(101));
        for (id, amount) in &out {
            assert!(amount <= &current[id]);
        }
    }

    #[test]
    fn test_undelegation_rejects_bad_input() {
        let current = allocations(&[("a", 100)]);
        let target = intents(&[("a", "1")]);
        assert!(matches!(
            allocate_undelegation(&current, &BTreeMap::new(), &int(100), &target, &current, &uatom(-5)),
            Err(AllocationError::NonPositiveAmount(_))
        ));
        assert_eq!(
            allocate_undelegation(&current, &BTreeMap::new(), &int(100), &target, &current, &Coins::default()),
            Err(AllocationError::InvalidCoinCount(0))
        );
        assert_eq!(
            allocate_undelegation(&current, &BTreeMap::new(), &int(100), &target, &current, &uatom(101)),
            Err(AllocationError::InsufficientAvailability { requested: int(101), available: int(100) })
        );
    }
}
