use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;

use utilbill_core::Currency;
use utilbill_invoicing::CirculationSettings;

/// Runtime settings for the billing services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingConfig {
    /// Upper bound on each storage call.
    pub storage_timeout: Duration,
    /// How far before the period start / after the period end a boundary
    /// reading may lie.
    pub reading_window_days: u32,
    /// Due date = period end + this many days.
    pub invoice_due_days: u32,
    /// Currency used when the organization record does not say otherwise.
    pub default_currency: Currency,
    /// Postgres backend when set, in-memory otherwise.
    pub database_url: Option<String>,
    /// Building circulation fee factors.
    pub circulation: CirculationSettings,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_millis(5_000),
            reading_window_days: 7,
            invoice_due_days: 14,
            default_currency: Currency::Eur,
            database_url: None,
            circulation: CirculationSettings::default(),
        }
    }
}

impl BillingConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let storage_timeout = match lookup("UTILBILL_STORAGE_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("UTILBILL_STORAGE_TIMEOUT_MS is not a number: {raw}"))?,
            ),
            None => defaults.storage_timeout,
        };
        let reading_window_days = parse_or(&lookup, "UTILBILL_READING_WINDOW_DAYS", defaults.reading_window_days)?;
        let invoice_due_days = parse_or(&lookup, "UTILBILL_INVOICE_DUE_DAYS", defaults.invoice_due_days)?;
        let default_currency = match lookup("UTILBILL_CURRENCY") {
            Some(raw) => raw
                .parse::<Currency>()
                .map_err(|e| anyhow::anyhow!("UTILBILL_CURRENCY: {e}"))?,
            None => defaults.default_currency,
        };
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let mut circulation = defaults.circulation;
        if let Some(raw) = lookup("UTILBILL_CIRCULATION_RATE") {
            circulation.rate_per_apartment = Decimal::from_str(raw.trim())
                .with_context(|| format!("UTILBILL_CIRCULATION_RATE is not a decimal: {raw}"))?;
            if circulation.rate_per_apartment < Decimal::ZERO {
                anyhow::bail!("UTILBILL_CIRCULATION_RATE must not be negative");
            }
        }

        if storage_timeout.is_zero() {
            anyhow::bail!("UTILBILL_STORAGE_TIMEOUT_MS must be greater than zero");
        }

        Ok(Self {
            storage_timeout,
            reading_window_days,
            invoice_due_days,
            default_currency,
            database_url,
            circulation,
        })
    }
}

fn parse_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> anyhow::Result<u32> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .with_context(|| format!("{key} is not a non-negative integer: {raw}")),
        None => Ok(default),
    }
}
