//! One tenant-scoped repository per persisted record type, over a single backend.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use utilbill_invoicing::Invoice;
use utilbill_metering::{Meter, MeterReading};
use utilbill_properties::{Building, Organization, Property, Renter};
use utilbill_tariffs::{Provider, Tariff};

use crate::audit::{AuditEntry, AuditTrail};
use crate::config::BillingConfig;
use crate::postgres::{self, PgStorage};
use crate::tenancy::{InMemoryStorage, Record, Storage, TenantScopedRepository};

#[derive(Debug, Clone)]
pub struct Stores {
    pub organizations: TenantScopedRepository<Organization>,
    pub buildings: TenantScopedRepository<Building>,
    pub properties: TenantScopedRepository<Property>,
    pub renters: TenantScopedRepository<Renter>,
    pub meters: TenantScopedRepository<Meter>,
    pub readings: TenantScopedRepository<MeterReading>,
    pub providers: TenantScopedRepository<Provider>,
    pub tariffs: TenantScopedRepository<Tariff>,
    pub invoices: TenantScopedRepository<Invoice>,
    pub audit: AuditTrail,
}

impl Stores {
    fn build(timeout: Duration, audit: Arc<dyn Storage<AuditEntry>>, backend: &dyn StorageFactory) -> Self {
        let audit = AuditTrail::new(audit).with_timeout(timeout);
        Self {
            organizations: scoped(backend.organizations(), &audit, timeout),
            buildings: scoped(backend.buildings(), &audit, timeout),
            properties: scoped(backend.properties(), &audit, timeout),
            renters: scoped(backend.renters(), &audit, timeout),
            meters: scoped(backend.meters(), &audit, timeout),
            readings: scoped(backend.readings(), &audit, timeout),
            providers: scoped(backend.providers(), &audit, timeout),
            tariffs: scoped(backend.tariffs(), &audit, timeout),
            invoices: scoped(backend.invoices(), &audit, timeout),
            audit,
        }
    }

    /// Postgres-backed stores sharing one pool.
    pub fn postgres(pool: PgPool, timeout: Duration) -> Self {
        let backend = PgBackend(Arc::new(pool));
        Self::build(timeout, Arc::new(PgStorage::<AuditEntry>::shared(backend.0.clone())), &backend)
    }

    /// Postgres when `DATABASE_URL` is configured, in-memory otherwise.
    pub async fn from_config(config: &BillingConfig) -> anyhow::Result<Self> {
        match &config.database_url {
            Some(url) => {
                let pool = postgres::connect(url, config.storage_timeout).await?;
                postgres::migrate(&pool).await?;
                tracing::info!("using postgres storage");
                Ok(Self::postgres(pool, config.storage_timeout))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory storage");
                Ok(InMemoryBackend::new().stores(config.storage_timeout))
            }
        }
    }
}

fn scoped<T: Record>(storage: Arc<dyn Storage<T>>, audit: &AuditTrail, timeout: Duration) -> TenantScopedRepository<T> {
    TenantScopedRepository::new(storage, audit.clone()).with_timeout(timeout)
}

trait StorageFactory {
    fn organizations(&self) -> Arc<dyn Storage<Organization>>;
    fn buildings(&self) -> Arc<dyn Storage<Building>>;
    fn properties(&self) -> Arc<dyn Storage<Property>>;
    fn renters(&self) -> Arc<dyn Storage<Renter>>;
    fn meters(&self) -> Arc<dyn Storage<Meter>>;
    fn readings(&self) -> Arc<dyn Storage<MeterReading>>;
    fn providers(&self) -> Arc<dyn Storage<Provider>>;
    fn tariffs(&self) -> Arc<dyn Storage<Tariff>>;
    fn invoices(&self) -> Arc<dyn Storage<Invoice>>;
}

struct PgBackend(Arc<PgPool>);

impl PgBackend {
    fn storage<T: Record>(&self) -> Arc<dyn Storage<T>> {
        Arc::new(PgStorage::<T>::shared(self.0.clone()))
    }
}

impl StorageFactory for PgBackend {
    fn organizations(&self) -> Arc<dyn Storage<Organization>> {
        self.storage()
    }
    fn buildings(&self) -> Arc<dyn Storage<Building>> {
        self.storage()
    }
    fn properties(&self) -> Arc<dyn Storage<Property>> {
        self.storage()
    }
    fn renters(&self) -> Arc<dyn Storage<Renter>> {
        self.storage()
    }
    fn meters(&self) -> Arc<dyn Storage<Meter>> {
        self.storage()
    }
    fn readings(&self) -> Arc<dyn Storage<MeterReading>> {
        self.storage()
    }
    fn providers(&self) -> Arc<dyn Storage<Provider>> {
        self.storage()
    }
    fn tariffs(&self) -> Arc<dyn Storage<Tariff>> {
        self.storage()
    }
    fn invoices(&self) -> Arc<dyn Storage<Invoice>> {
        self.storage()
    }
}

/// In-memory tables, kept reachable so tests can inspect rows and inject faults.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    pub organizations: Arc<InMemoryStorage<Organization>>,
    pub buildings: Arc<InMemoryStorage<Building>>,
    pub properties: Arc<InMemoryStorage<Property>>,
    pub renters: Arc<InMemoryStorage<Renter>>,
    pub meters: Arc<InMemoryStorage<Meter>>,
    pub readings: Arc<InMemoryStorage<MeterReading>>,
    pub providers: Arc<InMemoryStorage<Provider>>,
    pub tariffs: Arc<InMemoryStorage<Tariff>>,
    pub invoices: Arc<InMemoryStorage<Invoice>>,
    pub audit: Arc<InMemoryStorage<AuditEntry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(&self, timeout: Duration) -> Stores {
        Stores::build(timeout, self.audit.clone(), self)
    }
}

impl StorageFactory for InMemoryBackend {
    fn organizations(&self) -> Arc<dyn Storage<Organization>> {
        self.organizations.clone()
    }
    fn buildings(&self) -> Arc<dyn Storage<Building>> {
        self.buildings.clone()
    }
    fn properties(&self) -> Arc<dyn Storage<Property>> {
        self.properties.clone()
    }
    fn renters(&self) -> Arc<dyn Storage<Renter>> {
        self.renters.clone()
    }
    fn meters(&self) -> Arc<dyn Storage<Meter>> {
        self.meters.clone()
    }
    fn readings(&self) -> Arc<dyn Storage<MeterReading>> {
        self.readings.clone()
    }
    fn providers(&self) -> Arc<dyn Storage<Provider>> {
        self.providers.clone()
    }
    fn tariffs(&self) -> Arc<dyn Storage<Tariff>> {
        self.tariffs.clone()
    }
    fn invoices(&self) -> Arc<dyn Storage<Invoice>> {
        self.invoices.clone()
    }
}
