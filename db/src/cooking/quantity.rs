//! Exact decimal quantities.
//!
//! Stored columns are `NUMERIC(10, 2)`, so accepted input is limited to two
//! fractional digits and eight integral ones.

use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use serde::{de, Deserialize, Deserializer};

use crate::errors::{Result, StoreError};

const MAX_SCALE: i64 = 2;
const UPPER_BOUND: i64 = 100_000_000;
const MAX_INTEGER_DIGITS: i64 = 8;

/// Parses a decimal quantity without going through binary floats.
pub fn parse(field: &'static str, raw: &str) -> Result<BigDecimal> {
    let raw = raw.trim();
    BigDecimal::from_str(raw)
        .map_err(|_| StoreError::validation(field, format!("'{raw}' is not a decimal number")))
}

/// Checks that a quantity fits the stored precision and normalises it to two
/// decimal places.
pub fn fit(field: &'static str, quantity: &BigDecimal) -> Result<BigDecimal> {
    let normalized = quantity.normalized();
    let (_, scale) = normalized.as_bigint_and_exponent();
    let integer_digits = i64::try_from(normalized.digits())
        .unwrap_or(i64::MAX)
        .saturating_sub(scale);

    if scale > MAX_SCALE {
        return Err(StoreError::validation(
            field,
            format!("{quantity} has more than {MAX_SCALE} decimal places"),
        ));
    }

    if integer_digits > MAX_INTEGER_DIGITS || quantity.abs() >= BigDecimal::from(UPPER_BOUND) {
        return Err(too_large(field));
    }

    Ok(quantity.with_scale(MAX_SCALE))
}

pub(crate) fn too_large(field: &'static str) -> StoreError {
    StoreError::validation(field, format!("must be below {UPPER_BOUND}"))
}

/// Like [`fit`] but additionally requires a strictly positive value.
pub fn fit_positive(field: &'static str, quantity: &BigDecimal) -> Result<BigDecimal> {
    if *quantity <= BigDecimal::zero() {
        return Err(StoreError::validation(
            field,
            format!("{quantity} must be greater than zero"),
        ));
    }
    fit(field, quantity)
}

/// Accepts a JSON number or a numeric string.
pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(serde_json::Number),
        Text(String),
    }

    let raw = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    };

    BigDecimal::from_str(raw.trim())
        .map_err(|_| de::Error::custom(format!("'{raw}' is not a decimal number")))
}
