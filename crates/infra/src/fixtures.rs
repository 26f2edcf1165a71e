//! Shared builders for service-level tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;

use utilbill_core::{Currency, TenantId, UserId};
use utilbill_events::{BillingEvent, EventEnvelope, InMemoryEventBus};
use utilbill_metering::{Meter, MeterReading, ServiceType, UtilityType};
use utilbill_properties::{Building, Organization, Property, PropertyKind, Renter};
use utilbill_tariffs::{Provider, Tariff, TariffConfiguration};

use crate::billing::BillingService;
use crate::config::BillingConfig;
use crate::notifications::Notifier;
use crate::readings::ReadingService;
use crate::stores::{InMemoryBackend, Stores};
use crate::tariff_admin::TariffAdmin;
use crate::tariff_resolver::TariffResolver;
use crate::tenancy::TenantContext;

pub type Bus = InMemoryEventBus<EventEnvelope<BillingEvent>>;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// In-memory backend plus every service wired over it.
pub struct World {
    pub backend: InMemoryBackend,
    pub stores: Stores,
    pub bus: Arc<Bus>,
    pub config: BillingConfig,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(BillingConfig::default())
    }

    pub fn with_config(config: BillingConfig) -> Self {
        utilbill_observability::tracing::init_for_tests();
        let backend = InMemoryBackend::new();
        let stores = backend.stores(config.storage_timeout);
        Self {
            backend,
            stores,
            bus: Arc::new(InMemoryEventBus::new()),
            config,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_config(BillingConfig {
            storage_timeout: timeout,
            ..BillingConfig::default()
        })
    }

    pub fn notifier(&self) -> Notifier<Bus> {
        Notifier::new(self.bus.clone())
    }

    pub fn resolver(&self) -> TariffResolver {
        TariffResolver::new(self.stores.providers.clone(), self.stores.tariffs.clone())
    }

    pub fn billing(&self) -> BillingService<Bus> {
        BillingService::new(self.stores.clone(), self.config.clone(), self.notifier())
    }

    pub fn readings(&self) -> ReadingService<Bus> {
        ReadingService::new(
            self.stores.meters.clone(),
            self.stores.readings.clone(),
            self.resolver(),
            self.stores.audit.clone(),
            self.notifier(),
        )
    }

    pub fn tariff_admin(&self) -> TariffAdmin<Bus> {
        TariffAdmin::new(
            self.stores.providers.clone(),
            self.stores.tariffs.clone(),
            self.stores.audit.clone(),
            self.notifier(),
        )
    }

    /// Organization + context for a fresh tenant.
    pub async fn tenant(&self, currency: Currency) -> (TenantId, TenantContext) {
        let org = Organization::new("Harbour Lofts", "en-GB", currency).unwrap();
        let tenant = org.id;
        let ctx = TenantContext::for_tenant_id(tenant);
        self.stores.organizations.create(&ctx, org).await.unwrap();
        (tenant, ctx)
    }

    /// A property with one active renter.
    pub async fn renter(&self, ctx: &TenantContext, name: &str) -> Renter {
        let property = Property::new(format!("{name}'s flat"), PropertyKind::Apartment, Decimal::from(54)).unwrap();
        let property = self.stores.properties.create(ctx, property).await.unwrap();
        self.stores
            .renters
            .create(ctx, Renter::new(property.id, name))
            .await
            .unwrap()
    }

    pub async fn building(&self, ctx: &TenantContext, building: Building) -> Building {
        self.stores.buildings.create(ctx, building).await.unwrap()
    }

    /// An active renter of a flat in `building`.
    pub async fn renter_in(&self, ctx: &TenantContext, building: &Building, name: &str) -> Renter {
        let property = Property::new(format!("{name}'s flat"), PropertyKind::Apartment, Decimal::from(54))
            .unwrap()
            .in_building(building.id);
        let property = self.stores.properties.create(ctx, property).await.unwrap();
        self.stores
            .renters
            .create(ctx, Renter::new(property.id, name))
            .await
            .unwrap()
    }

    pub async fn meter(&self, ctx: &TenantContext, renter: &Renter, serial: &str, utility: UtilityType, zoned: bool) -> Meter {
        self.stores
            .meters
            .create(ctx, Meter::new(renter.property_id, serial, utility, zoned))
            .await
            .unwrap()
    }

    /// Stores a reading directly, without the entry checks.
    pub async fn raw_reading(
        &self,
        ctx: &TenantContext,
        meter: &Meter,
        value: Decimal,
        on: NaiveDate,
        zone: Option<&str>,
    ) -> MeterReading {
        let reading = MeterReading::new(meter.id, value, on, zone.map(str::to_string), UserId::new());
        self.stores.readings.create(ctx, reading).await.unwrap()
    }

    pub async fn tariff(
        &self,
        ctx: &TenantContext,
        service: ServiceType,
        utility: UtilityType,
        raw: serde_json::Value,
        from: NaiveDate,
    ) -> Tariff {
        let provider = self
            .stores
            .providers
            .create(ctx, Provider::new(format!("{service} co"), service))
            .await
            .unwrap();
        let configuration = TariffConfiguration::from_json(utility, &raw).unwrap();
        let tariff = Tariff::new(provider.id, "standard", configuration, from, None).unwrap();
        self.stores.tariffs.create(ctx, tariff).await.unwrap()
    }

    pub async fn flat_water_tariff(&self, ctx: &TenantContext) -> Tariff {
        self.tariff(
            ctx,
            ServiceType::Water,
            UtilityType::ColdWater,
            json!({ "type": "flat", "supply_rate": 0.97, "fixed_fee": 0.85 }),
            date(2024, 1, 1),
        )
        .await
    }

    pub async fn day_night_tariff(&self, ctx: &TenantContext) -> Tariff {
        self.tariff(
            ctx,
            ServiceType::Electricity,
            UtilityType::Electricity,
            json!({
                "type": "time_of_use",
                "zones": [
                    { "id": "day", "start": "07:00", "end": "23:00", "rate": 0.18 },
                    { "id": "night", "start": "23:00", "end": "07:00", "rate": 0.10 }
                ]
            }),
            date(2024, 1, 1),
        )
        .await
    }
}
