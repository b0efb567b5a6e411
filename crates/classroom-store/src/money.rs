//! Monetary amounts. Stored and computed as integer cents.

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// How far `n * 100` may sit from a whole cent and still count as one.
/// Absorbs binary float error (`0.1 + 0.2`), not a third decimal.
const CENT_TOLERANCE: f64 = 1e-6;

/// An amount as submitted by a client: either a JSON number (`4.5`) or a
/// decimal string (`"4.50"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    /// Converts to whole cents. Negative, non-finite or malformed amounts
    /// and amounts with more than two decimals are rejected.
    pub fn to_cents(&self, field: &str) -> Result<i64, StoreError> {
        let invalid = || StoreError::Validation(format!("Invalid numeric value for {field}"));
        match self {
            Self::Number(n) => {
                if !n.is_finite() || *n < 0.0 || *n > (i64::MAX / 100) as f64 {
                    return Err(invalid());
                }
                let scaled = n * 100.0;
                let cents = scaled.round();
                if (scaled - cents).abs() > CENT_TOLERANCE {
                    return Err(invalid());
                }
                Ok(cents as i64)
            }
            Self::Text(s) => parse_cents(s).ok_or_else(invalid),
        }
    }
}

/// Parses `"12"`, `"12.5"` or `"12.50"` into cents.
pub fn parse_cents(s: &str) -> Option<i64> {
    let s = s.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !digits(whole) || !digits(frac) || frac.len() > 2 {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(frac)
}

/// Formats cents as a decimal string with two places.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
