//! Reading entry and correction.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use utilbill_core::UserId;
use utilbill_events::{BillingEvent, EventBus, EventEnvelope};
use utilbill_metering::{Meter, MeterId, MeterReading, ReadingError, ReadingId, check_new_reading};
use utilbill_tariffs::TariffConfiguration;

use crate::audit::{AuditEntry, AuditKind, AuditTrail};
use crate::notifications::Notifier;
use crate::tariff_resolver::{ResolveError, TariffResolver};
use crate::tenancy::{Filter, RepositoryError, TenantContext, TenantScopedRepository};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadingServiceError {
    #[error(transparent)]
    Invalid(#[from] ReadingError),

    #[error("zone '{zone}' is not declared by tariff '{tariff}'")]
    UndeclaredZone { zone: String, tariff: String },

    #[error("a correction needs a reason")]
    ReasonRequired,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct ReadingService<B> {
    meters: TenantScopedRepository<Meter>,
    readings: TenantScopedRepository<MeterReading>,
    resolver: TariffResolver,
    audit: AuditTrail,
    notifier: Notifier<B>,
}

impl<B> ReadingService<B>
where
    B: EventBus<EventEnvelope<BillingEvent>>,
{
    pub fn new(
        meters: TenantScopedRepository<Meter>,
        readings: TenantScopedRepository<MeterReading>,
        resolver: TariffResolver,
        audit: AuditTrail,
        notifier: Notifier<B>,
    ) -> Self {
        Self {
            meters,
            readings,
            resolver,
            audit,
            notifier,
        }
    }

    async fn series(&self, ctx: &TenantContext, meter_id: MeterId) -> Result<Vec<MeterReading>, RepositoryError> {
        self.readings
            .find_where(ctx, vec![Filter::eq("meter_id", uuid::Uuid::from(meter_id))])
            .await
    }

    /// Record a new reading.
    ///
    /// Rejects unknown meters, a zone on a single-register meter (or none on a
    /// zoned one), a zone the tariff in force does not declare, values that
    /// break the monotonic series, and a second reading for the same
    /// (meter, zone, date).
    #[instrument(skip(self, ctx), fields(tenant_id = tracing::field::Empty), err)]
    pub async fn submit_reading(
        &self,
        ctx: &TenantContext,
        entered_by: UserId,
        meter_id: MeterId,
        value: Decimal,
        reading_date: NaiveDate,
        zone: Option<String>,
    ) -> Result<MeterReading, ReadingServiceError> {
        let tenant = ctx.require()?;
        tracing::Span::current().record("tenant_id", tracing::field::display(tenant));

        let meter = self.meters.get(ctx, meter_id).await?;
        let existing = self.series(ctx, meter_id).await?;
        let candidate = MeterReading::new(meter_id, value, reading_date, zone, entered_by);
        check_new_reading(&meter, &existing, &candidate)?;

        if let Some(zone) = candidate.zone() {
            self.ensure_zone_declared(ctx, &meter, zone, reading_date).await?;
        }
        let slot_zone = candidate.zone.clone();

        match self.readings.create(ctx, candidate).await {
            Ok(reading) => {
                tracing::info!(reading_id = %reading.id, meter_id = %meter_id, "reading recorded");
                Ok(reading)
            }
            // Lost a race with a concurrent submit for the same slot.
            Err(err) if err.is_unique_violation() => Err(ReadingError::Duplicate {
                date: reading_date,
                zone: slot_zone,
            }
            .into()),
            Err(err) => Err(err.into()),
        }
    }

    async fn ensure_zone_declared(
        &self,
        ctx: &TenantContext,
        meter: &Meter,
        zone: &str,
        as_of: NaiveDate,
    ) -> Result<(), ReadingServiceError> {
        let tariff = match self.resolver.resolve(ctx, meter.utility, as_of).await {
            Ok(tariff) => tariff,
            Err(ResolveError::NoTariffActive { .. }) => return Ok(()),
            Err(ResolveError::Repository(err)) => return Err(err.into()),
        };
        match &tariff.configuration {
            TariffConfiguration::TimeOfUse(tou) if !tou.declares(zone) => Err(ReadingServiceError::UndeclaredZone {
                zone: zone.to_string(),
                tariff: tariff.name.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Change a reading's value, keeping the before/after values in the audit trail.
    ///
    /// The audit entry is written first; when it cannot be written the reading
    /// is left untouched. Invoices already generated keep their snapshots.
    #[instrument(skip(self, ctx, reason), fields(tenant_id = tracing::field::Empty), err)]
    pub async fn correct_reading(
        &self,
        ctx: &TenantContext,
        actor: UserId,
        reading_id: ReadingId,
        corrected_value: Decimal,
        reason: &str,
    ) -> Result<MeterReading, ReadingServiceError> {
        let tenant = ctx.require()?;
        tracing::Span::current().record("tenant_id", tracing::field::display(tenant));
        if reason.trim().is_empty() {
            return Err(ReadingServiceError::ReasonRequired);
        }

        let original = self.readings.get(ctx, reading_id).await?;
        let meter = self.meters.get(ctx, original.meter_id).await?;
        let existing = self.series(ctx, original.meter_id).await?;

        let mut corrected = original.clone();
        corrected.value = corrected_value;
        check_new_reading(&meter, &existing, &corrected)?;

        let entry = AuditEntry::new(AuditKind::ReadingCorrected, "meter_readings")
            .tenant(tenant)
            .actor(actor)
            .subject(reading_id.into())
            .before(serde_json::to_value(&original).ok())
            .after(serde_json::to_value(&corrected).ok())
            .reason(reason);
        self.audit.record(entry).await?;

        let saved = self.readings.update(ctx, reading_id, corrected).await?;

        self.notifier.publish(
            tenant,
            BillingEvent::ReadingCorrected {
                reading_id: reading_id.into(),
                meter_id: meter.id.into(),
                previous_value: original.value,
                corrected_value,
                reason: reason.to_string(),
                occurred_at: Utc::now(),
            },
        );
        Ok(saved)
    }

    /// Zone a reading taken at `at` belongs to, per the tariff in force that day.
    ///
    /// `None` for single-register meters, flat tariffs, or when no tariff applies.
    pub async fn suggest_zone(
        &self,
        ctx: &TenantContext,
        meter_id: MeterId,
        at: NaiveDateTime,
    ) -> Result<Option<String>, ReadingServiceError> {
        let meter = self.meters.get(ctx, meter_id).await?;
        if !meter.supports_zones {
            return Ok(None);
        }
        let tariff = match self.resolver.resolve(ctx, meter.utility, at.date()).await {
            Ok(tariff) => tariff,
            Err(ResolveError::NoTariffActive { .. }) => return Ok(None),
            Err(ResolveError::Repository(err)) => return Err(err.into()),
        };
        Ok(match &tariff.configuration {
            TariffConfiguration::TimeOfUse(tou) => tou.zone_at(at).map(|z| z.id.clone()),
            TariffConfiguration::Flat(_) => None,
        })
    }
}
