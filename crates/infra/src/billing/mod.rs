//! Invoice generation and lifecycle orchestration.

pub mod report;
pub mod service;

use thiserror::Error;

use utilbill_invoicing::InvoiceError;

use crate::tenancy::RepositoryError;

pub use report::{BillingRunReport, RenterFailure};
pub use service::BillingService;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BillingError {
    #[error("no tenant context is active")]
    TenantContextMissing,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Invoice(#[from] InvoiceError),

    /// A concurrent writer changed the invoice first and the fresh state would
    /// still accept the request; the caller may retry.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("transient storage failure: {0}")]
    TransientStorage(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for BillingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::TenantContextMissing => BillingError::TenantContextMissing,
            RepositoryError::NotFound { entity, id } => BillingError::NotFound { entity, id },
            RepositoryError::TransientStorage(msg) => BillingError::TransientStorage(msg),
            other => BillingError::Repository(other),
        }
    }
}

impl BillingError {
    /// Whether the same call may succeed if repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Concurrency(_) | BillingError::TransientStorage(_))
    }
}
