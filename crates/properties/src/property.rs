use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use utilbill_core::{DomainError, TenantId, entity_id, tenant_owned_record};

entity_id!(
    /// Building identifier.
    BuildingId
);
entity_id!(
    /// Property (billable unit) identifier.
    PropertyId
);
entity_id!(
    /// Tenant-renter identifier: the occupant being billed.
    RenterId
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub id: BuildingId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub address: String,
    /// Apartments sharing the hot-water circulation loop.
    #[serde(default)]
    pub apartments: u32,
    /// Measured summer circulation energy (kWh per month), the heating-season baseline.
    #[serde(default)]
    pub circulation_summer_average: Option<Decimal>,
}

impl Building {
    pub fn new(name: impl Into<String>, address: impl Into<String>, apartments: u32) -> Self {
        Self {
            id: BuildingId::new(),
            tenant_id: None,
            name: name.into(),
            address: address.into(),
            apartments,
            circulation_summer_average: None,
        }
    }

    pub fn with_summer_average(mut self, kwh: Decimal) -> Self {
        self.circulation_summer_average = Some(kwh);
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Apartment,
    House,
}

impl PropertyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyKind::Apartment => "apartment",
            PropertyKind::House => "house",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub tenant_id: Option<TenantId>,
    pub building_id: Option<BuildingId>,
    pub address: String,
    pub kind: PropertyKind,
    pub area_sqm: Decimal,
}

impl Property {
    pub fn new(address: impl Into<String>, kind: PropertyKind, area_sqm: Decimal) -> Result<Self, DomainError> {
        if area_sqm <= Decimal::ZERO {
            return Err(DomainError::validation("property area must be positive"));
        }
        Ok(Self {
            id: PropertyId::new(),
            tenant_id: None,
            building_id: None,
            address: address.into(),
            kind,
            area_sqm,
        })
    }

    pub fn in_building(mut self, building_id: BuildingId) -> Self {
        self.building_id = Some(building_id);
        self
    }
}

/// The occupant billed for a property. Distinct from the platform tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renter {
    pub id: RenterId,
    pub tenant_id: Option<TenantId>,
    pub property_id: PropertyId,
    pub name: String,
    pub email: Option<String>,
    pub active: bool,
    pub moved_in_at: DateTime<Utc>,
}

impl Renter {
    pub fn new(property_id: PropertyId, name: impl Into<String>) -> Self {
        Self {
            id: RenterId::new(),
            tenant_id: None,
            property_id,
            name: name.into(),
            email: None,
            active: true,
            moved_in_at: Utc::now(),
        }
    }
}

tenant_owned_record!(Building, BuildingId, "buildings");
tenant_owned_record!(Property, PropertyId, "properties");
tenant_owned_record!(Renter, RenterId, "renters");

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use utilbill_core::TenantOwned;

    #[test]
    fn new_records_are_unstamped_until_persisted() {
        let mut property = Property::new("Gedimino pr. 1-4", PropertyKind::Apartment, dec!(54.3)).unwrap();
        assert_eq!(property.tenant_id(), None);

        let tenant = TenantId::new();
        property.assign_tenant(tenant);
        assert_eq!(property.tenant_id(), Some(tenant));
    }

    #[test]
    fn non_positive_area_is_rejected() {
        assert!(Property::new("x", PropertyKind::House, dec!(0)).is_err());
    }
}
