//! Infrastructure layer: tenant-scoped storage, Postgres, audit trail,
//! configuration and the billing services built on them.

pub mod audit;
pub mod billing;
pub mod config;
pub mod notifications;
pub mod postgres;
pub mod readings;
pub mod stores;
pub mod tariff_admin;
pub mod tariff_resolver;
pub mod tenancy;

pub use audit::{AuditEntry, AuditId, AuditKind, AuditTrail};
pub use billing::{BillingError, BillingRunReport, BillingService, RenterFailure};
pub use config::BillingConfig;
pub use notifications::Notifier;
pub use readings::{ReadingService, ReadingServiceError};
pub use stores::{InMemoryBackend, Stores};
pub use tariff_admin::{NewTariff, TariffAdmin, TariffAdminError};
pub use tariff_resolver::{ResolveError, TariffResolver};
pub use tenancy::{RepositoryError, TenantContext, TenantScopedRepository};

#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod integration_tests;
