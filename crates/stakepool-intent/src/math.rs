//! EXACT ARITHMETIC
//!
//! Thin wrapper over `num-bigint` / `num-rational`. Every ratio in the engine is a
//! [`Dec`] (an exact rational, never rounded) and every token amount is an [`Int`].
//! Converting a `Dec` into an `Int` always truncates toward zero, so a sum of
//! truncated shares can never exceed the total it was split from.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use std::str::FromStr;
use thiserror::Error;

/// Arbitrary-precision token amount.
pub type Int = BigInt;

/// Exact decimal (rational) used for weights, ratios and signed deltas.
pub type Dec = BigRational;

pub fn int(value: i64) -> Int {
    Int::from(value)
}

pub fn dec(value: i64) -> Dec {
    Dec::from_integer(Int::from(value))
}

pub fn dec_from_int(value: &Int) -> Dec {
    Dec::from_integer(value.clone())
}

/// Drop the fractional part, rounding toward zero.
pub fn truncate(value: &Dec) -> Int {
    value.to_integer()
}

/// `numer / denom` as an exact decimal, `None` when `denom` is zero.
pub fn ratio(numer: &Int, denom: &Int) -> Option<Dec> {
    if denom.is_zero() {
        return None;
    }
    Some(Dec::new(numer.clone(), denom.clone()))
}

/// `truncate(value × numer / denom)`; zero when `denom` is zero.
pub fn mul_div_trunc(value: &Int, numer: &Int, denom: &Int) -> Int {
    match ratio(numer, denom) {
        Some(share) => truncate(&(dec_from_int(value) * share)),
        None => Int::zero(),
    }
}

pub fn min_int(a: &Int, b: &Int) -> Int {
    if a <= b {
        a.clone()
    } else {
        b.clone()
    }
}

pub fn max_int(a: &Int, b: &Int) -> Int {
    if a >= b {
        a.clone()
    } else {
        b.clone()
    }
}

/// Parse a plain decimal literal (`"0.25"`, `"-3"`, `".5"`) into an exact `Dec`.
pub fn parse_dec(input: &str) -> Result<Dec, MathError> {
    let trimmed = input.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (whole, frac) = body.split_once('.').unwrap_or((body, ""));

    let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !is_digits(whole) || !is_digits(frac) {
        return Err(MathError::InvalidDecimal(input.to_string()));
    }

    let digits = format!("{}{}", whole, frac);
    let numer = Int::from_str(&digits).map_err(|_| MathError::InvalidDecimal(input.to_string()))?;
    let denom = num_traits::pow(Int::from(10), frac.len());
    let value = Dec::new(numer, denom);

    Ok(if negative { -value } else { value })
}

/// Render a `Dec` with a fixed number of fractional digits (truncated), for logs.
pub fn format_dec(value: &Dec, precision: usize) -> String {
    let sign = if value.is_negative() { "-" } else { "" };
    let magnitude = value.abs();
    let whole = magnitude.trunc().to_integer();
    if precision == 0 {
        return format!("{}{}", sign, whole);
    }
    let scale = num_traits::pow(Int::from(10), precision);
    let frac = (magnitude.fract() * Dec::from_integer(scale)).to_integer();
    format!("{}{}.{:0>width$}", sign, whole, frac.to_string(), width = precision)
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MathError {
    #[error("Invalid decimal literal: {0:?}")]
    InvalidDecimal(String),
}
