use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use utilbill_core::TenantId;
use utilbill_invoicing::InvoiceId;
use utilbill_properties::RenterId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenterFailure {
    pub renter_id: RenterId,
    pub reason: String,
    pub retryable: bool,
}

/// Outcome of one tenant's billing run over a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRunReport {
    pub tenant_id: TenantId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Drafts created by this run.
    pub generated: Vec<InvoiceId>,
    /// Invoices that already existed for the period.
    pub reused: Vec<InvoiceId>,
    pub failed: Vec<RenterFailure>,
    /// Per-meter rating warnings of the drafts generated by this run.
    pub warnings: Vec<(RenterId, String)>,
}

impl BillingRunReport {
    pub fn new(tenant_id: TenantId, period_start: NaiveDate, period_end: NaiveDate) -> Self {
        Self {
            tenant_id,
            period_start,
            period_end,
            generated: Vec::new(),
            reused: Vec::new(),
            failed: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn renters_processed(&self) -> usize {
        self.generated.len() + self.reused.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.warnings.is_empty()
    }

    /// Renters worth retrying in a later run.
    pub fn retryable(&self) -> impl Iterator<Item = RenterId> + '_ {
        self.failed.iter().filter(|f| f.retryable).map(|f| f.renter_id)
    }
}
