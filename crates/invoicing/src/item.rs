use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use utilbill_core::{Currency, entity_id};
use utilbill_metering::MeterId;
use utilbill_tariffs::TariffId;

use crate::InvoiceError;

entity_id!(
    /// Invoice line identifier, unique within its invoice.
    ItemId
);

/// Readings and tariff an item was rated from, frozen at creation.
///
/// Later corrections to readings or tariffs never alter an existing snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingSnapshot {
    pub meter_id: MeterId,
    pub meter_serial: String,
    pub zone: Option<String>,
    pub previous_value: Decimal,
    pub previous_date: NaiveDate,
    pub current_value: Decimal,
    pub current_date: NaiveDate,
    pub tariff_id: TariffId,
    pub tariff_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: ItemId,
    pub description: String,
    pub quantity: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
    pub fixed_fee: Decimal,
    /// `round(quantity * unit_price + fixed_fee)` in the invoice currency.
    /// Only ever computed here; the invoice reprices every item it accepts.
    total: Decimal,
    pub snapshot: Option<ReadingSnapshot>,
}

impl InvoiceItem {
    /// Build an item and compute its rounded total.
    pub fn priced(
        description: impl Into<String>,
        quantity: Decimal,
        unit: impl Into<String>,
        unit_price: Decimal,
        fixed_fee: Decimal,
        currency: Currency,
    ) -> Self {
        Self {
            id: ItemId::new(),
            description: description.into(),
            quantity,
            unit: unit.into(),
            unit_price,
            fixed_fee,
            total: line_total(quantity, unit_price, fixed_fee, currency),
            snapshot: None,
        }
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    /// A copy whose total is recomputed in `currency`.
    pub(crate) fn priced_in(&self, currency: Currency) -> Self {
        let mut next = self.clone();
        next.total = line_total(next.quantity, next.unit_price, next.fixed_fee, currency);
        next
    }

    pub fn with_snapshot(mut self, snapshot: ReadingSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), InvoiceError> {
        if self.description.trim().is_empty() {
            return Err(InvoiceError::validation("item description cannot be empty"));
        }
        if self.quantity < Decimal::ZERO {
            return Err(InvoiceError::validation("item quantity must not be negative"));
        }
        if self.unit_price < Decimal::ZERO || self.fixed_fee < Decimal::ZERO {
            return Err(InvoiceError::validation("item prices must not be negative"));
        }
        Ok(())
    }

    /// A copy with `update` applied and the total recomputed.
    ///
    /// Items rated from readings keep their quantity and prices: the snapshot
    /// must keep explaining the total.
    pub(crate) fn edited(&self, update: &ItemUpdate, currency: Currency) -> Result<Self, InvoiceError> {
        if self.snapshot.is_some() && update.reprices(self) {
            return Err(InvoiceError::validation(format!(
                "item {} was rated from meter readings; remove it and add a manual item instead",
                self.id
            )));
        }
        let mut next = self.clone();
        if let Some(description) = &update.description {
            next.description = description.clone();
        }
        if let Some(quantity) = update.quantity {
            next.quantity = quantity;
        }
        if let Some(unit_price) = update.unit_price {
            next.unit_price = unit_price;
        }
        if let Some(fixed_fee) = update.fixed_fee {
            next.fixed_fee = fixed_fee;
        }
        next.total = line_total(next.quantity, next.unit_price, next.fixed_fee, currency);
        next.validate()?;
        Ok(next)
    }
}

/// Partial edit of a draft item; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub fixed_fee: Option<Decimal>,
}

impl ItemUpdate {
    fn reprices(&self, item: &InvoiceItem) -> bool {
        self.quantity.is_some_and(|q| q != item.quantity)
            || self.unit_price.is_some_and(|p| p != item.unit_price)
            || self.fixed_fee.is_some_and(|f| f != item.fixed_fee)
    }
}

fn line_total(quantity: Decimal, unit_price: Decimal, fixed_fee: Decimal, currency: Currency) -> Decimal {
    currency.round(quantity * unit_price + fixed_fee)
}
