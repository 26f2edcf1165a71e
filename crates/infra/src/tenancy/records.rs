//! `Record` implementations for the persisted domain types.

use uuid::Uuid;

use utilbill_core::{AggregateRoot, TenantOwned};
use utilbill_invoicing::Invoice;
use utilbill_metering::{Meter, MeterReading};
use utilbill_properties::{Building, Organization, Property, Renter};
use utilbill_tariffs::{Provider, Tariff};

use super::query::Value;
use super::storage::Record;

fn uuid(id: impl Into<Uuid>) -> Value {
    Value::Uuid(id.into())
}

impl Record for Organization {
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![("name", self.name.clone().into()), ("active", self.active.into())]
    }
}

impl Record for Building {
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![("name", self.name.clone().into())]
    }
}

impl Record for Property {
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("building_id", self.building_id.map(Uuid::from).into()),
            ("kind", self.kind.as_str().into()),
        ]
    }
}

impl Record for Renter {
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![("property_id", uuid(self.property_id)), ("active", self.active.into())]
    }
}

impl Record for Meter {
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("property_id", uuid(self.property_id)),
            ("utility", self.utility.as_str().into()),
            ("serial_number", self.serial_number.clone().into()),
        ]
    }
}

impl Record for MeterReading {
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("meter_id", uuid(self.meter_id)),
            ("zone", self.zone.clone().into()),
            ("reading_date", self.reading_date.into()),
            ("value", self.value.into()),
        ]
    }

    /// One reading per (meter, zone, date); a missing zone counts as a value.
    fn unique_key(&self) -> Option<(&'static str, Vec<Value>)> {
        Some((
            "meter_readings_meter_zone_date_key",
            vec![uuid(self.meter_id), self.zone.clone().into(), self.reading_date.into()],
        ))
    }
}

impl Record for Provider {
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![("service", self.service.as_str().into()), ("name", self.name.clone().into())]
    }
}

impl Record for Tariff {
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("provider_id", uuid(self.provider_id)),
            ("active_from", self.active_from.into()),
            ("active_until", self.active_until.into()),
        ]
    }
}

impl Record for Invoice {
    fn columns(&self) -> Vec<(&'static str, Value)> {
        let (start, end) = self.period();
        vec![
            ("renter_id", uuid(self.renter_id())),
            ("period_start", start.into()),
            ("period_end", end.into()),
            ("status", self.status().as_str().into()),
            ("version", self.version().into()),
        ]
    }

    fn unique_key(&self) -> Option<(&'static str, Vec<Value>)> {
        let (start, end) = self.period();
        Some((
            "invoices_renter_period_key",
            vec![self.tenant_id().into(), uuid(self.renter_id()), start.into(), end.into()],
        ))
    }
}
