use chrono::NaiveDate;
use thiserror::Error;
use tracing::instrument;

use utilbill_metering::UtilityType;
use utilbill_tariffs::{Provider, Tariff, select_active};

use crate::tenancy::{Filter, RepositoryError, TenantContext, TenantScopedRepository};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no tariff active for {utility} on {as_of}")]
    NoTariffActive { utility: UtilityType, as_of: NaiveDate },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Finds the tariff in force for a utility on a date, within the active tenant.
///
/// Utility → service → provider(s) → tariffs of those providers whose window
/// contains the date. Time of day plays no part here.
#[derive(Debug, Clone)]
pub struct TariffResolver {
    providers: TenantScopedRepository<Provider>,
    tariffs: TenantScopedRepository<Tariff>,
}

impl TariffResolver {
    pub fn new(providers: TenantScopedRepository<Provider>, tariffs: TenantScopedRepository<Tariff>) -> Self {
        Self { providers, tariffs }
    }

    #[instrument(skip(self, ctx), fields(tenant_id = ?ctx.get()), err)]
    pub async fn resolve(
        &self,
        ctx: &TenantContext,
        utility: UtilityType,
        as_of: NaiveDate,
    ) -> Result<Tariff, ResolveError> {
        let service = utility.service();
        let providers = self
            .providers
            .find_where(ctx, vec![Filter::eq("service", service.as_str())])
            .await?;
        if providers.is_empty() {
            tracing::debug!(service = %service, "no provider for service");
            return Err(ResolveError::NoTariffActive { utility, as_of });
        }

        let mut candidates = Vec::new();
        for provider in &providers {
            let tariffs = self
                .tariffs
                .find_where(
                    ctx,
                    vec![
                        Filter::eq("provider_id", uuid::Uuid::from(provider.id)),
                        Filter::lte("active_from", as_of),
                    ],
                )
                .await?;
            candidates.extend(tariffs);
        }

        select_active(&candidates, as_of)
            .cloned()
            .ok_or(ResolveError::NoTariffActive { utility, as_of })
    }
}
