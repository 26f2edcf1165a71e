//! Currency and monetary rounding.
//!
//! Amounts are `rust_decimal::Decimal` throughout; floats never touch money.
//! Rounding is round-half-up (midpoint away from zero) to the currency's minor
//! unit, applied once per line item.

use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// ISO-4217 currencies an organization can bill in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eur,
    Usd,
    Gbp,
    Pln,
    Jpy,
}

impl Currency {
    pub fn code(self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Gbp => "GBP",
            Currency::Pln => "PLN",
            Currency::Jpy => "JPY",
        }
    }

    /// Number of decimal places of the minor unit.
    pub fn minor_units(self) -> u32 {
        match self {
            Currency::Jpy => 0,
            _ => 2,
        }
    }

    /// Round an amount to this currency's minor unit (round-half-up).
    pub fn round(self, amount: Decimal) -> Decimal {
        round_money(amount, self.minor_units())
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::Eur
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EUR" => Ok(Currency::Eur),
            "USD" => Ok(Currency::Usd),
            "GBP" => Ok(Currency::Gbp),
            "PLN" => Ok(Currency::Pln),
            "JPY" => Ok(Currency::Jpy),
            other => Err(DomainError::validation(format!("unsupported currency: {other}"))),
        }
    }
}

/// Round half-up to `dp` decimal places.
pub fn round_money(amount: Decimal, dp: u32) -> Decimal {
    amount.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}
