use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use utilbill_core::{TenantId, UserId, entity_id, tenant_owned_record};
use utilbill_properties::PropertyId;

use crate::UtilityType;

entity_id!(
    /// Meter identifier.
    MeterId
);
entity_id!(
    /// Meter reading identifier.
    ReadingId
);

/// A physical meter installed in a property.
///
/// `supports_zones` is fixed at creation: a zoned meter records one reading
/// per declared tariff zone on each reading date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub id: MeterId,
    pub tenant_id: Option<TenantId>,
    pub property_id: PropertyId,
    pub serial_number: String,
    pub utility: UtilityType,
    pub supports_zones: bool,
}

impl Meter {
    pub fn new(
        property_id: PropertyId,
        serial_number: impl Into<String>,
        utility: UtilityType,
        supports_zones: bool,
    ) -> Self {
        Self {
            id: MeterId::new(),
            tenant_id: None,
            property_id,
            serial_number: serial_number.into(),
            utility,
            supports_zones,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReading {
    pub id: ReadingId,
    pub tenant_id: Option<TenantId>,
    pub meter_id: MeterId,
    pub value: Decimal,
    pub reading_date: NaiveDate,
    pub zone: Option<String>,
    pub entered_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl MeterReading {
    pub fn new(
        meter_id: MeterId,
        value: Decimal,
        reading_date: NaiveDate,
        zone: Option<String>,
        entered_by: UserId,
    ) -> Self {
        Self {
            id: ReadingId::new(),
            tenant_id: None,
            meter_id,
            value,
            reading_date,
            zone,
            entered_by,
            created_at: Utc::now(),
        }
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    /// True when this reading belongs to the same series as `zone`.
    pub fn in_zone(&self, zone: Option<&str>) -> bool {
        self.zone.as_deref() == zone
    }
}

tenant_owned_record!(Meter, MeterId, "meters");
tenant_owned_record!(MeterReading, ReadingId, "meter_readings");
