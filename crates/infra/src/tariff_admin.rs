//! Tariff administration: creation with overlap checks, audited
//! configuration changes, and rollback to an audited configuration.

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::instrument;

use utilbill_core::{DomainError, UserId};
use utilbill_events::{BillingEvent, EventBus, EventEnvelope};
use utilbill_metering::UtilityType;
use utilbill_tariffs::{
    ConfigurationError, Provider, ProviderId, Tariff, TariffConfiguration, TariffError, TariffId, ensure_no_overlap,
};

use crate::audit::{AuditEntry, AuditId, AuditKind, AuditTrail};
use crate::notifications::Notifier;
use crate::tenancy::{Filter, RepositoryError, TenantContext, TenantScopedRepository};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TariffAdminError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Overlap(#[from] TariffError),

    #[error("{utility} is not supplied by a {service} provider")]
    ServiceMismatch { utility: UtilityType, service: String },

    #[error("audit entry {0} does not hold a configuration of this tariff")]
    NotRollbackable(AuditId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct TariffAdmin<B> {
    providers: TenantScopedRepository<Provider>,
    tariffs: TenantScopedRepository<Tariff>,
    audit: AuditTrail,
    notifier: Notifier<B>,
}

/// Input for [`TariffAdmin::create_tariff`].
#[derive(Debug, Clone)]
pub struct NewTariff {
    pub provider_id: ProviderId,
    pub name: String,
    /// Utility the configuration's rate fields are named for.
    pub utility: UtilityType,
    pub configuration: serde_json::Value,
    pub active_from: NaiveDate,
    pub active_until: Option<NaiveDate>,
}

impl<B> TariffAdmin<B>
where
    B: EventBus<EventEnvelope<BillingEvent>>,
{
    pub fn new(
        providers: TenantScopedRepository<Provider>,
        tariffs: TenantScopedRepository<Tariff>,
        audit: AuditTrail,
        notifier: Notifier<B>,
    ) -> Self {
        Self {
            providers,
            tariffs,
            audit,
            notifier,
        }
    }

    async fn provider_tariffs(&self, ctx: &TenantContext, provider_id: ProviderId) -> Result<Vec<Tariff>, RepositoryError> {
        self.tariffs
            .find_where(ctx, vec![Filter::eq("provider_id", uuid::Uuid::from(provider_id))])
            .await
    }

    /// The provider, provided it supplies `utility`'s service.
    async fn supplier_of(
        &self,
        ctx: &TenantContext,
        provider_id: ProviderId,
        utility: UtilityType,
    ) -> Result<Provider, TariffAdminError> {
        let provider = self.providers.get(ctx, provider_id).await?;
        if utility.service() != provider.service {
            return Err(TariffAdminError::ServiceMismatch {
                utility,
                service: provider.service.to_string(),
            });
        }
        Ok(provider)
    }

    #[instrument(skip(self, ctx, input), fields(provider_id = %input.provider_id), err)]
    pub async fn create_tariff(&self, ctx: &TenantContext, input: NewTariff) -> Result<Tariff, TariffAdminError> {
        let provider = self.supplier_of(ctx, input.provider_id, input.utility).await?;

        let configuration = TariffConfiguration::from_json(input.utility, &input.configuration)?;
        let tariff = Tariff::new(
            provider.id,
            input.name,
            configuration,
            input.active_from,
            input.active_until,
        )?;
        ensure_no_overlap(&self.provider_tariffs(ctx, provider.id).await?, &tariff)?;

        let tariff = self.tariffs.create(ctx, tariff).await?;
        tracing::info!(tariff_id = %tariff.id, kind = tariff.configuration.kind(), "tariff created");
        Ok(tariff)
    }

    /// Replace a tariff's configuration, auditing the previous one.
    #[instrument(skip(self, ctx, configuration, reason), err)]
    pub async fn update_configuration(
        &self,
        ctx: &TenantContext,
        actor: UserId,
        tariff_id: TariffId,
        utility: UtilityType,
        configuration: &serde_json::Value,
        reason: Option<&str>,
    ) -> Result<Tariff, TariffAdminError> {
        let tenant = ctx.require()?;
        let current = self.tariffs.get(ctx, tariff_id).await?;
        self.supplier_of(ctx, current.provider_id, utility).await?;
        let next = TariffConfiguration::from_json(utility, configuration)?;

        let mut entry = AuditEntry::new(AuditKind::TariffConfigurationChanged, "tariffs")
            .tenant(tenant)
            .actor(actor)
            .subject(tariff_id.into())
            .before(Some(current.configuration.to_json()))
            .after(Some(next.to_json()));
        if let Some(reason) = reason {
            entry = entry.reason(reason);
        }
        self.audit.record(entry).await?;

        let mut updated = current;
        updated.configuration = next;
        Ok(self.tariffs.update(ctx, tariff_id, updated).await?)
    }

    /// Restore the configuration a `TariffConfigurationChanged` entry replaced.
    #[instrument(skip(self, ctx, reason), err)]
    pub async fn rollback_configuration(
        &self,
        ctx: &TenantContext,
        actor: UserId,
        tariff_id: TariffId,
        audit_id: AuditId,
        reason: &str,
    ) -> Result<Tariff, TariffAdminError> {
        let tenant = ctx.require()?;
        let current = self.tariffs.get(ctx, tariff_id).await?;

        let source = self
            .audit
            .find(tenant, audit_id)
            .await?
            .filter(|e| {
                e.kind == AuditKind::TariffConfigurationChanged && e.subject_id == Some(uuid::Uuid::from(tariff_id))
            })
            .ok_or(TariffAdminError::NotRollbackable(audit_id))?;
        let restored: TariffConfiguration = source
            .before
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
            .ok_or(TariffAdminError::NotRollbackable(audit_id))?;

        let entry = AuditEntry::new(AuditKind::TariffRollbackApplied, "tariffs")
            .tenant(tenant)
            .actor(actor)
            .subject(tariff_id.into())
            .before(Some(current.configuration.to_json()))
            .after(Some(restored.to_json()))
            .reason(reason)
            .detail("restored_from", audit_id.to_string());
        self.audit.record(entry).await?;

        let mut updated = current;
        updated.configuration = restored;
        let saved = self.tariffs.update(ctx, tariff_id, updated).await?;

        self.notifier.publish(
            tenant,
            BillingEvent::TariffRollbackApplied {
                tariff_id: tariff_id.into(),
                restored_from: audit_id.into(),
                occurred_at: Utc::now(),
            },
        );
        tracing::info!(%tariff_id, %audit_id, "tariff configuration rolled back");
        Ok(saved)
    }
}
