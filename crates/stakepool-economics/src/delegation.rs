//! DELEGATION ALLOCATOR
//!
//! Splits an inbound deposit across validators so the pool moves toward its
//! target weights. Validators furthest below target receive the most; when the
//! combined shortfall exceeds the deposit every share is scaled down
//! proportionally. Truncation dust is handed in full to one validator so the
//! result always sums to the deposit.

use crate::error::AllocationError;
use itertools::Itertools;
use log::{debug, info};
use num_traits::{Signed, Zero};
use stakepool_intent::math::{max_int, mul_div_trunc};
use stakepool_intent::{dec_from_int, truncate, Coins, Int, ValidatorIntents};
use std::collections::BTreeMap;

pub fn allocate_delegation(
    current: &BTreeMap<String, Int>,
    current_sum: &Int,
    target: &ValidatorIntents,
    amount: &Coins,
) -> Result<BTreeMap<String, Int>, AllocationError> {
    let coin = amount.single_positive()?;
    if target.is_empty() {
        return Err(AllocationError::EmptyTarget);
    }
    let input = &coin.amount;
    let projected = dec_from_int(&(current_sum + input));

    let validators: Vec<String> = current.keys().cloned().chain(target.keys()).sorted().dedup().collect();

    let mut shares: BTreeMap<String, Int> = BTreeMap::new();
    let mut shortfall = Int::zero();
    for id in &validators {
        let desired = truncate(&(target.weight_of(id) * &projected));
        let held = current.get(id).cloned().unwrap_or_else(Int::zero);
        let share = max_int(&(desired - held), &Int::zero());
        shortfall += &share;
        shares.insert(id.clone(), share);
    }

    if &shortfall > input {
        debug!("delegation shortfall {} exceeds deposit {}, scaling shares", shortfall, input);
        for share in shares.values_mut() {
            *share = mul_div_trunc(share, input, &shortfall);
        }
    }

    let allocated: Int = shares.values().sum();
    let dust = input - &allocated;
    if dust.is_negative() {
        return Err(AllocationError::InvariantViolation(format!(
            "allocated {} exceeds deposit {}",
            allocated, input
        )));
    }
    if dust.is_positive() {
        if let Some(first) = validators.first() {
            debug!("assigning delegation dust {} to {}", dust, first);
            *shares.entry(first.clone()).or_insert_with(Int::zero) += &dust;
        }
    }

    shares.retain(|_, share| !share.is_zero());
    info!("allocated delegation of {} across {} validators", coin, shares.len());
    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakepool_intent::{int, parse_dec, ValidatorIntent};

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
    fn test_delegation_even_target() {
        let current = allocations(&[("v1", 100), ("v2", 200)]);
        let target = intents(&[("v1", "0.5"), ("v2", "0.5")]);
        let out = allocate_delegation(&current, &int(300), &target, &uatom(1000)).unwrap();
        assert_eq!(out, allocations(&[("v1", 550), ("v2", 450)]));
    }

    #[test]
    fn test_delegation_uneven_target() {
        let current = allocations(&[("v1", 100), ("v2", 200)]);
        let target = intents(&[("v1", "0.3"), ("v2", "0.7")]);
        let out = allocate_delegation(&current, &int(300), &target, &uatom(1000)).unwrap();
        assert_eq!(out, allocations(&[("v1", 290), ("v2", 710)]));
    }

    #[test]
    fn test_delegation_scaled_with_dust() {
        // Weights sum to two, so the shortfall is larger than the deposit.
        let current = allocations(&[("v1", 100), ("v2", 200)]);
        let target = intents(&[("v1", "0.5"), ("v2", "0.5"), ("v3", "0.5"), ("v4", "0.5")]);
        let out = allocate_delegation(&current, &int(300), &target, &uatom(1000)).unwrap();
        assert_eq!(out, allocations(&[("v1", 241), ("v2", 195), ("v3", 282), ("v4", 282)]));
    }

    #[test]
    fn test_delegation_drops_zero_weight_validator() {
        let current = allocations(&[("v1", 100), ("v2", 200), ("v3", 300)]);
        let target = intents(&[("v1", "0.43"), ("v2", "0.57")]).normalize();
        let out = allocate_delegation(&current, &int(600), &target, &uatom(1000)).unwrap();
        assert_eq!(out, allocations(&[("v1", 453), ("v2", 547)]));
        assert!(!out.contains_key("v3"));
    }

    #[test]
    fn test_delegation_conserves_amount() {
        let current = allocations(&[("a", 17), ("b", 3), ("c", 991)]);
        let target = intents(&[("a", "0.2"), ("b", "0.3"), ("c", "0.1"), ("d", "0.4")]);
        let out = allocate_delegation(&current, &int(1011), &target, &uatom(777)).unwrap();
        assert_eq!(out.values().sum::<Int>(), int(777));
    }

    #[test]
    fn test_delegation_rejects_bad_input() {
        let target = intents(&[("v1", "1")]);
        let empty = BTreeMap::new();
        assert!(matches!(
            allocate_delegation(&empty, &int(0), &target, &uatom(0)),
            Err(AllocationError::NonPositiveAmount(_))
        ));
        assert_eq!(
            allocate_delegation(&empty, &int(0), &target, &Coins::default()),
            Err(AllocationError::InvalidCoinCount(0))
        );
        assert_eq!(
            allocate_delegation(&empty, &int(0), &ValidatorIntents::new(), &uatom(10)),
            Err(AllocationError::EmptyTarget)
        );
    }
}
