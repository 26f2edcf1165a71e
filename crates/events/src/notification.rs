//! Notifications the billing core publishes after a state change is persisted.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Event;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillingEvent {
    /// An invoice left Draft; subscribers may now deliver it to the renter.
    InvoiceFinalized {
        invoice_id: Uuid,
        renter_id: Uuid,
        total_amount: Decimal,
        currency: String,
        due_date: NaiveDate,
        occurred_at: DateTime<Utc>,
    },
    ReadingCorrected {
        reading_id: Uuid,
        meter_id: Uuid,
        previous_value: Decimal,
        corrected_value: Decimal,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
    TariffRollbackApplied {
        tariff_id: Uuid,
        /// Audit entry whose `before` configuration was restored.
        restored_from: Uuid,
        occurred_at: DateTime<Utc>,
    },
}

impl BillingEvent {
    /// Entity the event is about, as recorded on the envelope.
    pub fn subject(&self) -> (&'static str, Uuid) {
        match self {
            BillingEvent::InvoiceFinalized { invoice_id, .. } => ("invoice", *invoice_id),
            BillingEvent::ReadingCorrected { reading_id, .. } => ("meter_reading", *reading_id),
            BillingEvent::TariffRollbackApplied { tariff_id, .. } => ("tariff", *tariff_id),
        }
    }
}

impl Event for BillingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BillingEvent::InvoiceFinalized { .. } => "billing.invoice.finalized",
            BillingEvent::ReadingCorrected { .. } => "billing.reading.corrected",
            BillingEvent::TariffRollbackApplied { .. } => "billing.tariff.rollback_applied",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BillingEvent::InvoiceFinalized { occurred_at, .. }
            | BillingEvent::ReadingCorrected { occurred_at, .. }
            | BillingEvent::TariffRollbackApplied { occurred_at, .. } => *occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventEnvelope, TenantScoped};
    use utilbill_core::TenantId;

    #[test]
    fn envelope_copies_subject_and_type() {
        let tenant = TenantId::new();
        let tariff_id = Uuid::now_v7();
        let event = BillingEvent::TariffRollbackApplied {
            tariff_id,
            restored_from: Uuid::now_v7(),
            occurred_at: Utc::now(),
        };
        let (subject_type, subject_id) = event.subject();
        let envelope = EventEnvelope::wrap(tenant, subject_type, subject_id, event);

        assert_eq!(envelope.subject_type(), "tariff");
        assert_eq!(envelope.subject_id(), tariff_id);
        assert_eq!(envelope.event_type(), "billing.tariff.rollback_applied");
        assert!(envelope.belongs_to(tenant));
        assert!(!envelope.belongs_to(TenantId::new()));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let event = BillingEvent::ReadingCorrected {
            reading_id: Uuid::nil(),
            meter_id: Uuid::nil(),
            previous_value: Decimal::new(5150, 1),
            corrected_value: Decimal::new(5120, 1),
            reason: "typo".into(),
            occurred_at: DateTime::<Utc>::default(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "reading_corrected");
        assert_eq!(json["reason"], "typo");
    }
}
