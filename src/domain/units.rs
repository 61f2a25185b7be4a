//! Conversion between ledger base units and human-readable amounts.

use super::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest scale rust_decimal can represent.
pub const MAX_DECIMALS: u32 = 28;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("{0} decimals exceeds the supported maximum of 28")]
    TooManyDecimals(u32),
    #[error("base-unit amount {0} is out of decimal range")]
    OutOfRange(u128),
    #[error("amount {0} cannot be expressed in base units")]
    NotRepresentable(String),
}

/// Normalization factor of a token, expressed as its number of decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUnits {
    decimals: u32,
}

impl TokenUnits {
    pub fn new(decimals: u32) -> Result<Self, UnitsError> {
        if decimals > MAX_DECIMALS {
            return Err(UnitsError::TooManyDecimals(decimals));
        }
        Ok(Self { decimals })
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// `10^decimals` as a decimal.
    pub fn factor(&self) -> Decimal {
        Decimal::new(RustDecimal::from_i128_with_scale(
            10i128.pow(self.decimals),
            0,
        ))
    }

    /// Convert a raw base-unit balance into human units (`balance / 10^decimals`).
    pub fn normalize(&self, balance: u128) -> Result<Decimal, UnitsError> {
        let raw = i128::try_from(balance).map_err(|_| UnitsError::OutOfRange(balance))?;
        RustDecimal::try_from_i128_with_scale(raw, self.decimals)
            .map(Decimal::new)
            .map_err(|_| UnitsError::OutOfRange(balance))
    }

    /// Convert a human amount into base units, truncating toward zero.
    pub fn to_base_units(&self, amount: Decimal) -> Result<u128, UnitsError> {
        if amount.is_negative() {
            return Err(UnitsError::NotRepresentable(amount.to_canonical_string()));
        }
        amount
            .checked_mul(self.factor())
            .and_then(|scaled| scaled.inner().trunc().to_u128())
            .ok_or_else(|| UnitsError::NotRepresentable(amount.to_canonical_string()))
    }
}

/// Serde adapter for base-unit integers that travel as decimal strings.
pub mod amount_str {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = u128;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative integer or integer string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
                v.trim().parse::<u128>().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
                Ok(v as u128)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
                u128::try_from(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}
