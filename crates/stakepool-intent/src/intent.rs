//! VALIDATOR INTENT MODEL
//!
//! Weighted validator preferences. A depositor's intent is stored normalized
//! (weights sum to one); before intents of differently-sized depositors can be
//! combined they are *ordinalized*, i.e. scaled into absolute units.

use crate::math::{dec_from_int, format_dec, Dec, Int};
use log::debug;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Weight assigned to a single validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorIntent {
    pub validator_id: String,
    pub weight: Dec,
}

impl ValidatorIntent {
    pub fn new(validator_id: impl Into<String>, weight: Dec) -> Self {
        ValidatorIntent {
            validator_id: validator_id.into(),
            weight,
        }
    }
}

/// Ordered set of intents, unique by `validator_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ValidatorIntent>")]
pub struct ValidatorIntents(Vec<ValidatorIntent>);

impl ValidatorIntents {
    pub fn new() -> Self {
        ValidatorIntents(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidatorIntent> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ValidatorIntent> {
        self.0.iter_mut()
    }

    pub fn as_slice(&self) -> &[ValidatorIntent] {
        &self.0
    }

    pub fn get(&self, validator_id: &str) -> Option<&ValidatorIntent> {
        self.0.iter().find(|i| i.validator_id == validator_id)
    }

    pub fn get_mut(&mut self, validator_id: &str) -> Option<&mut ValidatorIntent> {
        self.0.iter_mut().find(|i| i.validator_id == validator_id)
    }

    /// Weight for `validator_id`, zero when absent.
    pub fn weight_of(&self, validator_id: &str) -> Dec {
        self.get(validator_id)
            .map(|i| i.weight.clone())
            .unwrap_or_else(Dec::zero)
    }

    /// Insert or replace the intent for `intent.validator_id`.
    pub fn set(&mut self, intent: ValidatorIntent) {
        match self.get_mut(&intent.validator_id) {
            Some(existing) => existing.weight = intent.weight,
            None => self.0.push(intent),
        }
    }

    /// Add `weight` to `validator_id`, appending a new entry when absent.
    pub fn add_weight(&mut self, validator_id: &str, weight: &Dec) {
        match self.get_mut(validator_id) {
            Some(existing) => existing.weight += weight,
            None => self.0.push(ValidatorIntent::new(validator_id, weight.clone())),
        }
    }

    /// Canonical order: ascending validator id.
    pub fn sort(&mut self) {
        self.0.sort_by(|a, b| a.validator_id.cmp(&b.validator_id));
    }

    pub fn sorted(mut self) -> Self {
        self.sort();
        self
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.iter().map(|i| i.validator_id.clone()).collect()
    }

    pub fn sum(&self) -> Dec {
        self.0.iter().fold(Dec::zero(), |acc, i| acc + &i.weight)
    }

    /// Rescale so the weights sum to one. A zero-sum set is returned unchanged.
    pub fn normalize(&self) -> Self {
        let total = self.sum();
        if total.is_zero() {
            return self.clone();
        }
        ValidatorIntents(
            self.0
                .iter()
                .map(|i| ValidatorIntent::new(i.validator_id.clone(), &i.weight / &total))
                .collect(),
        )
    }

    /// Scale every weight by an absolute multiplier.
    pub fn ordinalize(&self, multiplier: &Dec) -> Self {
        ValidatorIntents(
            self.0
                .iter()
                .map(|i| ValidatorIntent::new(i.validator_id.clone(), &i.weight * multiplier))
                .collect(),
        )
    }

    pub fn retain<F: FnMut(&ValidatorIntent) -> bool>(&mut self, keep: F) {
        self.0.retain(keep);
    }
}

impl From<Vec<ValidatorIntent>> for ValidatorIntents {
    fn from(intents: Vec<ValidatorIntent>) -> Self {
        let mut out = ValidatorIntents::new();
        for intent in intents {
            out.set(intent);
        }
        out
    }
}

impl FromIterator<ValidatorIntent> for ValidatorIntents {
    fn from_iter<T: IntoIterator<Item = ValidatorIntent>>(iter: T) -> Self {
        ValidatorIntents::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl IntoIterator for ValidatorIntents {
    type Item = ValidatorIntent;
    type IntoIter = std::vec::IntoIter<ValidatorIntent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidatorIntents {
    type Item = &'a ValidatorIntent;
    type IntoIter = std::slice::Iter<'a, ValidatorIntent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ValidatorIntents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|i| format!("{}:{}", i.validator_id, format_dec(&i.weight, 6)))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// A depositor's normalized validator preference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorIntent {
    pub delegator: String,
    pub intents: ValidatorIntents,
}

impl DelegatorIntent {
    pub fn new(delegator: impl Into<String>, intents: ValidatorIntents) -> Self {
        DelegatorIntent {
            delegator: delegator.into(),
            intents,
        }
    }

    pub fn ordinalize(&self, multiplier: &Dec) -> Self {
        DelegatorIntent::new(self.delegator.clone(), self.intents.ordinalize(multiplier))
    }

    pub fn normalize(&self) -> Self {
        DelegatorIntent::new(self.delegator.clone(), self.intents.normalize())
    }

    /// Fold ordinal `new_intents` into this intent.
    ///
    /// The existing weights are first raised to ordinal units with `multiplier`
    /// (typically the depositor's current balance), the new ordinal weights are
    /// added per validator, and the result is sorted and re-normalized. If the
    /// combined total is exactly zero the original intent is returned unchanged.
    pub fn add_ordinal(&self, multiplier: &Dec, new_intents: &ValidatorIntents) -> Self {
        if new_intents.is_empty() {
            return self.clone();
        }

        let mut combined = self.intents.ordinalize(multiplier);
        for intent in new_intents.clone().sorted() {
            combined.add_weight(&intent.validator_id, &intent.weight);
        }
        combined.sort();

        if combined.sum().is_zero() {
            debug!("add_ordinal for {} produced a zero total, keeping previous intent", self.delegator);
            return self.clone();
        }

        DelegatorIntent::new(self.delegator.clone(), combined.normalize())
    }
}

/// Combine every depositor's intent, weighted by their balance, into one
/// normalized target. Zero-weight validators are dropped.
pub fn aggregate_intents(delegators: &[(DelegatorIntent, Int)]) -> Result<ValidatorIntents, IntentError> {
    let mut aggregate: BTreeMap<String, Dec> = BTreeMap::new();
    let mut ordinal_sum = Dec::zero();

    for (intent, balance) in delegators {
        let ordinal = intent.intents.ordinalize(&dec_from_int(balance));
        for vi in ordinal.iter() {
            ordinal_sum += &vi.weight;
            *aggregate.entry(vi.validator_id.clone()).or_insert_with(Dec::zero) += &vi.weight;
        }
    }

    if !aggregate.is_empty() && ordinal_sum.is_zero() {
        return Err(IntentError::ZeroOrdinalSum);
    }

    let mut out: ValidatorIntents = aggregate
        .into_iter()
        .filter(|(_, weight)| weight.is_positive())
        .map(|(id, weight)| ValidatorIntent::new(id, weight / &ordinal_sum))
        .collect();
    out.sort();

    debug!("aggregated {} delegator intents into {}", delegators.len(), out);
    Ok(out)
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntentError {
    #[error("Ordinalized intent sum is zero; no balances recorded for the intents")]
    ZeroOrdinalSum,
    #[error("Invalid denom for zone: {0}")]
    InvalidDenom(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{dec, int, parse_dec};

    fn d(s: &str) -> Dec {
        parse_dec(s).unwrap()
    }

    fn intents(entries: &[(&str, &str)]) -> ValidatorIntents {
        entries
            .iter()
            .map(|(id, w)| ValidatorIntent::new(*id, d(w)))
            .collect()
    }

    #[test]
    fn test_set_upserts() {
        let mut set = intents(&[("b", "1"), ("a", "2")]);
        set.set(ValidatorIntent::new("a", d("5")));
        assert_eq!(set.len(), 2);
        assert_eq!(set.weight_of("a"), d("5"));
        set.set(ValidatorIntent::new("c", d("1")));
        assert_eq!(set.keys(), vec!["b", "a", "c"]);
        assert_eq!(set.sorted().keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_from_vec_deduplicates() {
        let set = ValidatorIntents::from(vec![
            ValidatorIntent::new("a", d("1")),
            ValidatorIntent::new("a", d("3")),
        ]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.weight_of("a"), d("3"));
    }

    #[test]
    fn test_normalize() {
        let set = intents(&[("a", "1"), ("b", "3")]).normalize();
        assert_eq!(set.weight_of("a"), d("0.25"));
        assert_eq!(set.weight_of("b"), d("0.75"));
        assert_eq!(set.normalize(), set);
    }

    #[test]
    fn test_normalize_zero_sum_is_noop() {
        let set = intents(&[("a", "0"), ("b", "0")]);
        assert_eq!(set.normalize(), set);
    }

    #[test]
    fn test_ordinalize() {
        let set = intents(&[("a", "0.5"), ("b", "0.5")]).ordinalize(&dec(1000));
        assert_eq!(set.weight_of("a"), dec(500));
        assert_eq!(set.sum(), dec(1000));
    }

    #[test]
    fn test_add_ordinal_merges_and_appends() {
        let existing = DelegatorIntent::new("user", intents(&[("a", "0.5"), ("b", "0.5")]));
        // 1000 existing units split 500/500, plus 500 new units on b and 1000 on c.
        let updated = existing.add_ordinal(&dec(1000), &intents(&[("c", "1000"), ("b", "500")]));
        assert_eq!(updated.intents.keys(), vec!["a", "b", "c"]);
        assert_eq!(updated.intents.weight_of("a"), d("0.2"));
        assert_eq!(updated.intents.weight_of("b"), d("0.4"));
        assert_eq!(updated.intents.weight_of("c"), d("0.4"));
        assert_eq!(updated.delegator, "user");
    }

    #[test]
    fn test_add_ordinal_empty_is_noop() {
        let existing = DelegatorIntent::new("user", intents(&[("b", "0.7"), ("a", "0.3")]));
        assert_eq!(existing.add_ordinal(&dec(10), &ValidatorIntents::new()), existing);
    }

    #[test]
    fn test_add_ordinal_zero_total_is_unchanged() {
        let existing = DelegatorIntent::new("user", intents(&[("a", "1")]));
        let updated = existing.add_ordinal(&dec(0), &intents(&[("b", "0")]));
        assert_eq!(updated, existing);
    }

    #[test]
    fn test_aggregate_intents() {
        let alice = DelegatorIntent::new("alice", intents(&[("a", "1")]));
        let bob = DelegatorIntent::new("bob", intents(&[("a", "0.5"), ("b", "0.5")]));
        let carol = DelegatorIntent::new("carol", intents(&[("c", "0")]));
        let out = aggregate_intents(&[(alice, int(100)), (bob, int(300)), (carol, int(50))]).unwrap();
        assert_eq!(out.keys(), vec!["a", "b"]);
        assert_eq!(out.weight_of("a"), d("0.625"));
        assert_eq!(out.weight_of("b"), d("0.375"));
    }

    #[test]
    fn test_aggregate_intents_zero_balances() {
        let alice = DelegatorIntent::new("alice", intents(&[("a", "1")]));
        assert_eq!(aggregate_intents(&[(alice, int(0))]), Err(IntentError::ZeroOrdinalSum));
        assert_eq!(aggregate_intents(&[]), Ok(ValidatorIntents::new()));
    }

    #[test]
    fn test_serde_round_trip() {
        let set = intents(&[("a", "0.25"), ("b", "0.75")]);
        let json = serde_json::to_string(&set).unwrap();
        let back: ValidatorIntents = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_deserialize_keeps_ids_unique() {
        let raw = vec![
            ValidatorIntent::new("a", d("0.25")),
            ValidatorIntent::new("b", d("0.5")),
            ValidatorIntent::new("a", d("0.75")),
        ];
        let json = serde_json::to_string(&raw).unwrap();
        let back: ValidatorIntents = serde_json::from_str(&json).unwrap();
        assert_eq!(back.keys(), vec!["a", "b"]);
        assert_eq!(back.weight_of("a"), d("0.75"));
    }
}
