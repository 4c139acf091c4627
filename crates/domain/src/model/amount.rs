use std::{fmt, str::FromStr};

use rust_decimal::prelude::*;
use thiserror::Error;

/// Fractional digits carried by the native asset.
pub const AMOUNT_DECIMALS: u32 = 7;
/// Stroops per whole unit of the native asset.
pub const STROOPS_PER_UNIT: i64 = 10_000_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("invalid decimal amount `{0}`")]
    Invalid(String),
    #[error("amount `{0}` cannot be negative")]
    Negative(String),
    #[error("amount `{0}` is out of range")]
    OutOfRange(String),
}

/// A native-asset quantity held as integer stroops.
///
/// Always rendered with exactly seven fractional digits, the precision the
/// ledger accepts in payment operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_stroops(stroops: i64) -> Self {
        Self(stroops)
    }

    pub const fn stroops(self) -> i64 {
        self.0
    }

    /// Parses a decimal string, truncating anything past seven digits.
    pub fn parse(value: &str) -> Result<Self, AmountError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.contains(['e', 'E']) {
            return Err(AmountError::Invalid(trimmed.to_string()));
        }

        let decimal =
            Decimal::from_str(trimmed).map_err(|_| AmountError::Invalid(trimmed.to_string()))?;
        if decimal.is_sign_negative() && !decimal.is_zero() {
            return Err(AmountError::Negative(trimmed.to_string()));
        }

        let stroops = decimal
            .round_dp_with_strategy(AMOUNT_DECIMALS, RoundingStrategy::ToZero)
            .checked_mul(Decimal::from(STROOPS_PER_UNIT))
            .and_then(|scaled| scaled.to_i64())
            .ok_or_else(|| AmountError::OutOfRange(trimmed.to_string()))?;

        Ok(Self(stroops))
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, AMOUNT_DECIMALS)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}
