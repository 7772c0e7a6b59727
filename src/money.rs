//! Money Module
//!
//! Fixed-point wallet amounts. All balances and transaction amounts are held
//! as `u64` minor units (kobo, cents) and converted to/from client strings only
//! here.
//!
//! ## Internal Representation
//! - Scale factor is `10^DECIMALS` (2 decimals: 1050 = "10.50")
//! - Storage columns are `BIGINT`, so every amount must also fit in `i64`
//!
//! ## Usage
//! ```rust
//! use wallet_ledger::money::{Amount, parse_amount};
//!
//! let amount = parse_amount("10.50").unwrap();
//! assert_eq!(amount, Amount::new(1050));
//! assert_eq!(amount.to_string(), "10.50");
//! ```

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use thiserror::Error;

/// Decimal places of the wallet currency
pub const DECIMALS: u32 = 2;

// ============================================================================
// Error Types
// ============================================================================

/// Money conversion errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Amount
// ============================================================================

/// Non-negative amount in minor currency units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Largest amount representable in a `BIGINT` column
    pub const MAX_STORABLE: Amount = Amount(i64::MAX as u64);

    #[inline]
    pub const fn new(minor_units: u64) -> Self {
        Self(minor_units)
    }

    #[inline]
    pub fn minor_units(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Convert to the signed storage representation
    pub fn to_storage(self) -> Result<i64, MoneyError> {
        i64::try_from(self.0).map_err(|_| MoneyError::Overflow)
    }

    /// Convert from the signed storage representation
    ///
    /// Negative values can only come from a corrupted row.
    pub fn from_storage(value: i64) -> Result<Self, MoneyError> {
        u64::try_from(value)
            .map(Amount)
            .map_err(|_| MoneyError::InvalidAmount)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(10u64.pow(DECIMALS))
    }
}

impl Deref for Amount {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_amount(*self))
    }
}

// ============================================================================
// Parse: Client → Internal
// ============================================================================

/// Convert a client string amount ("10.50", "100") to minor units
///
/// Rejects zero, signs, more than [`DECIMALS`] fractional digits and
/// anything that would not fit in storage. No silent truncation.
pub fn parse_amount(amount_str: &str) -> Result<Amount, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let (whole, frac) = match amount_str.split_once('.') {
        None => (amount_str, ""),
        Some((whole, frac)) => {
            // Require both sides of the dot: ".5" and "5." are ambiguous
            if whole.is_empty() || frac.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "use digits on both sides of the decimal point".into(),
                ));
            }
            if frac.contains('.') {
                return Err(MoneyError::InvalidFormat("multiple decimal points".into()));
            }
            (whole, frac)
        }
    };

    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat(format!(
            "invalid character in amount: {}",
            amount_str
        )));
    }

    if frac.len() > DECIMALS as usize {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac.len() as u32,
            max: DECIMALS,
        });
    }

    let whole_num: u64 = whole.parse().map_err(|_| MoneyError::Overflow)?;
    let frac_num: u64 = if frac.is_empty() {
        0
    } else {
        format!("{:0<width$}", frac, width = DECIMALS as usize)
            .parse()
            .map_err(|_| MoneyError::InvalidFormat("invalid fractional part".into()))?
    };

    let amount = whole_num
        .checked_mul(10u64.pow(DECIMALS))
        .and_then(|v| v.checked_add(frac_num))
        .ok_or(MoneyError::Overflow)?;

    if amount == 0 {
        return Err(MoneyError::InvalidAmount);
    }
    if amount > *Amount::MAX_STORABLE {
        return Err(MoneyError::Overflow);
    }

    Ok(Amount(amount))
}

/// Convert a `Decimal` (e.g. from a JSON body) to minor units
pub fn parse_decimal(decimal: Decimal) -> Result<Amount, MoneyError> {
    if decimal.is_sign_negative() || decimal.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    if decimal.scale() > DECIMALS {
        return Err(MoneyError::PrecisionOverflow {
            provided: decimal.scale(),
            max: DECIMALS,
        });
    }

    let scaled = decimal
        .checked_mul(Decimal::from(10u64.pow(DECIMALS)))
        .ok_or(MoneyError::Overflow)?;

    let value = scaled.to_u64().ok_or(MoneyError::Overflow)?;
    if value > *Amount::MAX_STORABLE {
        return Err(MoneyError::Overflow);
    }
    Ok(Amount(value))
}

// ============================================================================
// Format: Internal → Client
// ============================================================================

/// Format minor units with exactly [`DECIMALS`] places ("1050" → "10.50")
pub fn format_amount(amount: Amount) -> String {
    format!(
        "{:.prec$}",
        amount.to_decimal(),
        prec = DECIMALS as usize
    )
}
