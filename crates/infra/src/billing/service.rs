use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{Span, instrument};
use uuid::Uuid;

use utilbill_core::{Aggregate, AggregateRoot, Currency, ExpectedVersion};
use utilbill_events::{BillingEvent, EventBus, EventEnvelope};
use utilbill_invoicing::{
    CirculationCalculator, ConsumptionRater, CreateDraft, Invoice, InvoiceCommand, InvoiceError, InvoiceId, InvoiceItem, InvoiceStatus,
    ItemId, ItemUpdate,
};
use utilbill_metering::{Meter, MeterReading, readings_on_or_after, readings_on_or_before};
use utilbill_properties::{PropertyId, RenterId};

use crate::config::BillingConfig;
use crate::notifications::Notifier;
use crate::stores::Stores;
use crate::tariff_resolver::{ResolveError, TariffResolver};
use crate::tenancy::{Filter, TenantContext};

use super::report::{BillingRunReport, RenterFailure};
use super::BillingError;

/// Orchestrates invoice generation and every lifecycle transition.
///
/// The invoice aggregate decides; this service loads it through the
/// tenant-scoped repository, runs the command, and writes the result back with
/// a compare-and-set on `version`. A writer that loses the race re-runs the
/// command against the fresh state: a state conflict (e.g. already finalized)
/// is reported as such, anything else as `Concurrency`. There are no retries.
pub struct BillingService<B> {
    stores: Stores,
    resolver: TariffResolver,
    config: BillingConfig,
    notifier: Notifier<B>,
}

/// Items and warnings contributed by one meter or by the building.
#[derive(Default)]
struct ItemOutcome {
    items: Vec<InvoiceItem>,
    warnings: Vec<String>,
}

impl ItemOutcome {
    fn warning(message: String) -> Self {
        Self {
            items: Vec::new(),
            warnings: vec![message],
        }
    }
}

impl<B> BillingService<B>
where
    B: EventBus<EventEnvelope<BillingEvent>>,
{
    pub fn new(stores: Stores, config: BillingConfig, notifier: Notifier<B>) -> Self {
        let resolver = TariffResolver::new(stores.providers.clone(), stores.tariffs.clone());
        Self {
            stores,
            resolver,
            config,
            notifier,
        }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub async fn get(&self, ctx: &TenantContext, id: InvoiceId) -> Result<Invoice, BillingError> {
        Ok(self.stores.invoices.get(ctx, id).await?)
    }

    async fn find_existing(
        &self,
        ctx: &TenantContext,
        renter_id: RenterId,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Option<Invoice>, BillingError> {
        let found = self
            .stores
            .invoices
            .find_where(
                ctx,
                vec![
                    Filter::eq("renter_id", Uuid::from(renter_id)),
                    Filter::eq("period_start", period_start),
                    Filter::eq("period_end", period_end),
                ],
            )
            .await?;
        Ok(found.into_iter().next())
    }

    async fn billing_currency(&self, ctx: &TenantContext) -> Result<Currency, BillingError> {
        let tenant = ctx.require()?;
        let org = self.stores.organizations.find_by_id(ctx, tenant).await?;
        Ok(org.map(|o| o.currency).unwrap_or(self.config.default_currency))
    }

    /// Create the draft invoice for one renter and period.
    ///
    /// Idempotent on (renter, start, end): an existing invoice for the same key
    /// is returned unchanged, including when a concurrent call inserted it
    /// first. Per-meter rating failures become `generation_warnings`; only an
    /// invoice with no items at all is refused.
    #[instrument(skip(self, ctx), fields(tenant_id = tracing::field::Empty, item_count), err)]
    pub async fn generate_draft(
        &self,
        ctx: &TenantContext,
        renter_id: RenterId,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Invoice, BillingError> {
        let tenant = ctx.require()?;
        Span::current().record("tenant_id", tracing::field::display(tenant));

        if period_end <= period_start {
            return Err(InvoiceError::validation(format!("billing period is empty: {period_start}..{period_end}")).into());
        }
        if let Some(existing) = self.find_existing(ctx, renter_id, period_start, period_end).await? {
            tracing::debug!(invoice_id = %existing.id(), "draft already exists for period");
            return Ok(existing);
        }

        let renter = self.stores.renters.get(ctx, renter_id).await?;
        let currency = self.billing_currency(ctx).await?;
        let rater = ConsumptionRater::new(currency);

        let mut meters = self
            .stores
            .meters
            .find_where(ctx, vec![Filter::eq("property_id", Uuid::from(renter.property_id))])
            .await?;
        meters.sort_by(|a, b| a.serial_number.cmp(&b.serial_number));

        let mut items = Vec::new();
        let mut warnings = Vec::new();
        for meter in &meters {
            let outcome = self.rate_meter(ctx, &rater, meter, period_start, period_end).await?;
            items.extend(outcome.items);
            warnings.extend(outcome.warnings);
        }

        if items.is_empty() {
            tracing::warn!(renter_id = %renter_id, meters = meters.len(), warnings = ?warnings, "no billable items");
            return Err(InvoiceError::EmptyInvoice.into());
        }
        let circulation = self
            .circulation_fee(ctx, renter.property_id, currency, period_start)
            .await?;
        items.extend(circulation.items);
        warnings.extend(circulation.warnings);
        Span::current().record("item_count", items.len());

        let due_date = period_end
            .checked_add_days(Days::new(u64::from(self.config.invoice_due_days)))
            .unwrap_or(period_end);
        let draft = Invoice::draft(CreateDraft {
            renter_id,
            period_start,
            period_end,
            currency,
            due_date,
            items,
            warnings,
            occurred_at: Utc::now(),
        })?;

        match self.stores.invoices.create(ctx, draft).await {
            Ok(invoice) => {
                tracing::info!(
                    invoice_id = %invoice.id(),
                    total = %invoice.total_amount(),
                    warnings = invoice.generation_warnings().len(),
                    "draft invoice generated"
                );
                Ok(invoice)
            }
            Err(err) if err.is_unique_violation() => {
                tracing::info!(renter_id = %renter_id, "concurrent generation won; returning its invoice");
                self.find_existing(ctx, renter_id, period_start, period_end)
                    .await?
                    .ok_or_else(|| BillingError::Concurrency("invoice key taken but not visible".into()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Circulation fee of the property's building, if it has one. Storage
    /// failures abort generation; a missing or implausible building is a warning.
    async fn circulation_fee(
        &self,
        ctx: &TenantContext,
        property_id: PropertyId,
        currency: Currency,
        month: NaiveDate,
    ) -> Result<ItemOutcome, BillingError> {
        let property = self.stores.properties.get(ctx, property_id).await?;
        let Some(building_id) = property.building_id else {
            return Ok(ItemOutcome::default());
        };
        let Some(building) = self.stores.buildings.find_by_id(ctx, building_id).await? else {
            tracing::warn!(%building_id, "building not found, circulation fee skipped");
            return Ok(ItemOutcome::warning(format!(
                "building {building_id}: not found, circulation fee skipped"
            )));
        };

        let calculator = CirculationCalculator::new(self.config.circulation.clone(), currency);
        match calculator.item(&building, month) {
            Ok(item) => Ok(ItemOutcome {
                items: item.into_iter().collect(),
                warnings: Vec::new(),
            }),
            Err(err) => {
                tracing::warn!(building_id = %building.id, error = %err, "circulation fee skipped");
                Ok(ItemOutcome::warning(format!("{err}, circulation fee skipped")))
            }
        }
    }

    /// Rate one meter. Storage failures abort generation; anything about the
    /// meter's own data or tariff becomes a warning.
    async fn rate_meter(
        &self,
        ctx: &TenantContext,
        rater: &ConsumptionRater,
        meter: &Meter,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<ItemOutcome, BillingError> {
        let window = u64::from(self.config.reading_window_days);
        let readings = self
            .stores
            .readings
            .find_where(ctx, vec![Filter::eq("meter_id", Uuid::from(meter.id))])
            .await?;
        let previous: Vec<MeterReading> = readings_on_or_before(&readings, period_start, window)
            .into_iter()
            .cloned()
            .collect();
        let current: Vec<MeterReading> = readings_on_or_after(&readings, period_end, window)
            .into_iter()
            .cloned()
            .collect();

        let tariff = match self.resolver.resolve(ctx, meter.utility, period_start).await {
            Ok(tariff) => tariff,
            Err(ResolveError::Repository(err)) => return Err(err.into()),
            Err(err @ ResolveError::NoTariffActive { .. }) => {
                tracing::warn!(meter_id = %meter.id, error = %err, "meter skipped");
                return Ok(ItemOutcome::warning(format!("meter {}: {err}", meter.serial_number)));
            }
        };

        match rater.rate(meter, &previous, &current, &tariff) {
            Ok(rated) => Ok(ItemOutcome {
                items: rated.items,
                warnings: rated
                    .skipped_zones
                    .into_iter()
                    .map(|zone| format!("meter {}: zone '{zone}' skipped, missing reading", meter.serial_number))
                    .collect(),
            }),
            Err(err) => {
                tracing::warn!(meter_id = %meter.id, error = %err, "meter could not be rated");
                Ok(ItemOutcome::warning(err.to_string()))
            }
        }
    }

    /// Run `command` against the stored invoice and write it back with compare-and-set.
    async fn transition(
        &self,
        ctx: &TenantContext,
        id: InvoiceId,
        command: InvoiceCommand,
    ) -> Result<Invoice, BillingError> {
        let current = self.stores.invoices.get(ctx, id).await?;
        let expected = current.version();

        let mut next = current;
        next.execute(&command)?;

        if self.stores.invoices.update_if(ctx, id, ExpectedVersion::Exact(expected), next.clone()).await? {
            return Ok(next);
        }

        let fresh = self.stores.invoices.get(ctx, id).await?;
        fresh.handle(&command)?;
        tracing::warn!(invoice_id = %id, expected, actual = fresh.version(), "invoice changed concurrently");
        Err(BillingError::Concurrency(format!(
            "invoice {id} moved from version {expected} to {}",
            fresh.version()
        )))
    }

    #[instrument(skip(self, ctx, item), fields(tenant_id = ?ctx.get()), err)]
    pub async fn add_item(&self, ctx: &TenantContext, id: InvoiceId, item: InvoiceItem) -> Result<Invoice, BillingError> {
        let command = InvoiceCommand::AddItem {
            item,
            occurred_at: Utc::now(),
        };
        self.transition(ctx, id, command).await
    }

    #[instrument(skip(self, ctx, update), fields(tenant_id = ?ctx.get()), err)]
    pub async fn edit_item(
        &self,
        ctx: &TenantContext,
        id: InvoiceId,
        item_id: ItemId,
        update: ItemUpdate,
    ) -> Result<Invoice, BillingError> {
        let command = InvoiceCommand::EditItem {
            item_id,
            update,
            occurred_at: Utc::now(),
        };
        self.transition(ctx, id, command).await
    }

    #[instrument(skip(self, ctx), fields(tenant_id = ?ctx.get()), err)]
    pub async fn remove_item(&self, ctx: &TenantContext, id: InvoiceId, item_id: ItemId) -> Result<Invoice, BillingError> {
        let command = InvoiceCommand::RemoveItem {
            item_id,
            occurred_at: Utc::now(),
        };
        self.transition(ctx, id, command).await
    }

    /// Freeze a draft and notify subscribers.
    #[instrument(skip(self, ctx), fields(tenant_id = tracing::field::Empty), err)]
    pub async fn finalize(&self, ctx: &TenantContext, id: InvoiceId) -> Result<Invoice, BillingError> {
        let tenant = ctx.require()?;
        Span::current().record("tenant_id", tracing::field::display(tenant));

        let invoice = self
            .transition(ctx, id, InvoiceCommand::Finalize { occurred_at: Utc::now() })
            .await?;

        self.notifier.publish(
            tenant,
            BillingEvent::InvoiceFinalized {
                invoice_id: id.into(),
                renter_id: invoice.renter_id().into(),
                total_amount: invoice.total_amount(),
                currency: invoice.currency().code().to_string(),
                due_date: invoice.due_date(),
                occurred_at: invoice.finalized_at().unwrap_or_else(Utc::now),
            },
        );
        tracing::info!(invoice_id = %id, total = %invoice.total_amount(), "invoice finalized");
        Ok(invoice)
    }

    #[instrument(skip(self, ctx, reference), fields(tenant_id = ?ctx.get()), err)]
    pub async fn mark_paid(
        &self,
        ctx: &TenantContext,
        id: InvoiceId,
        amount: Decimal,
        reference: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> Result<Invoice, BillingError> {
        let command = InvoiceCommand::MarkPaid {
            amount,
            reference,
            paid_at,
        };
        let invoice = self.transition(ctx, id, command).await?;
        tracing::info!(invoice_id = %id, "invoice marked paid");
        Ok(invoice)
    }

    /// Delete a draft. Finalized and paid invoices are permanent.
    #[instrument(skip(self, ctx), fields(tenant_id = ?ctx.get()), err)]
    pub async fn delete(&self, ctx: &TenantContext, id: InvoiceId) -> Result<(), BillingError> {
        let current = self.stores.invoices.get(ctx, id).await?;
        current.ensure_deletable()?;

        let conditions = vec![
            Filter::eq("status", InvoiceStatus::Draft.as_str()),
            Filter::eq("version", current.version()),
        ];
        if self.stores.invoices.delete_where(ctx, id, conditions).await? {
            tracing::info!(invoice_id = %id, "draft invoice deleted");
            return Ok(());
        }

        let fresh = self.stores.invoices.get(ctx, id).await?;
        fresh.ensure_deletable()?;
        Err(BillingError::Concurrency(format!("invoice {id} changed before it could be deleted")))
    }

    /// Generate drafts for every active renter of the tenant.
    ///
    /// One renter's failure never stops the run; it is recorded in the report.
    #[instrument(skip(self, ctx), fields(tenant_id = tracing::field::Empty), err)]
    pub async fn run_billing(
        &self,
        ctx: &TenantContext,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<BillingRunReport, BillingError> {
        let tenant = ctx.require()?;
        Span::current().record("tenant_id", tracing::field::display(tenant));

        let mut renters = self
            .stores
            .renters
            .find_where(ctx, vec![Filter::eq("active", true)])
            .await?;
        renters.sort_by_key(|r| r.id);

        let mut report = BillingRunReport::new(tenant, period_start, period_end);
        for renter in renters {
            match self.find_existing(ctx, renter.id, period_start, period_end).await {
                Ok(Some(existing)) => {
                    report.reused.push(*existing.id());
                    continue;
                }
                Ok(None) => {}
                Err(err) => {
                    report.failed.push(RenterFailure {
                        renter_id: renter.id,
                        retryable: err.is_retryable(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            }

            match self.generate_draft(ctx, renter.id, period_start, period_end).await {
                Ok(invoice) => {
                    report.generated.push(*invoice.id());
                    report.warnings.extend(
                        invoice
                            .generation_warnings()
                            .iter()
                            .map(|w| (renter.id, w.clone())),
                    );
                }
                Err(err) => report.failed.push(RenterFailure {
                    renter_id: renter.id,
                    retryable: err.is_retryable(),
                    reason: err.to_string(),
                }),
            }
        }

        tracing::info!(
            generated = report.generated.len(),
            reused = report.reused.len(),
            failed = report.failed.len(),
            "billing run finished"
        );
        Ok(report)
    }
}
