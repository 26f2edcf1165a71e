use serde::{Deserialize, Serialize};

/// What a provider supplies. Providers are looked up by service, not utility.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Electricity,
    Water,
    Heating,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::Electricity => "electricity",
            ServiceType::Water => "water",
            ServiceType::Heating => "heating",
        }
    }
}

impl core::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a meter measures.
///
/// The dispatch table for everything utility-specific lives here: which
/// service supplies it, the billing unit, and the rate field name in a tariff
/// configuration. Adding a utility means adding one arm to each method.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilityType {
    Electricity,
    ColdWater,
    HotWater,
    Heating,
}

impl UtilityType {
    pub const ALL: [UtilityType; 4] = [
        UtilityType::Electricity,
        UtilityType::ColdWater,
        UtilityType::HotWater,
        UtilityType::Heating,
    ];

    pub fn service(self) -> ServiceType {
        match self {
            UtilityType::Electricity => ServiceType::Electricity,
            UtilityType::ColdWater | UtilityType::HotWater => ServiceType::Water,
            UtilityType::Heating => ServiceType::Heating,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            UtilityType::Electricity | UtilityType::Heating => "kWh",
            UtilityType::ColdWater | UtilityType::HotWater => "m³",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UtilityType::Electricity => "Electricity",
            UtilityType::ColdWater => "Cold water",
            UtilityType::HotWater => "Hot water",
            UtilityType::Heating => "Heating",
        }
    }

    /// Name of the per-unit rate field in a flat tariff configuration.
    pub fn rate_field(self) -> &'static str {
        match self.service() {
            ServiceType::Water => "supply_rate",
            ServiceType::Electricity | ServiceType::Heating => "rate",
        }
    }

    /// Optional second per-unit rate added on top of `rate_field`.
    pub fn surcharge_field(self) -> Option<&'static str> {
        match self.service() {
            ServiceType::Water => Some("sewage_rate"),
            ServiceType::Electricity | ServiceType::Heating => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UtilityType::Electricity => "electricity",
            UtilityType::ColdWater => "cold_water",
            UtilityType::HotWater => "hot_water",
            UtilityType::Heating => "heating",
        }
    }
}

impl core::fmt::Display for UtilityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn water_utilities_share_the_water_service() {
        assert_eq!(UtilityType::ColdWater.service(), ServiceType::Water);
        assert_eq!(UtilityType::HotWater.service(), ServiceType::Water);
        assert_eq!(UtilityType::HotWater.rate_field(), "supply_rate");
        assert_eq!(UtilityType::ColdWater.surcharge_field(), Some("sewage_rate"));
    }

    #[test]
    fn every_utility_has_a_unit_and_rate_field() {
        for utility in UtilityType::ALL {
            assert!(!utility.unit().is_empty());
            assert!(!utility.rate_field().is_empty());
        }
        assert_eq!(UtilityType::Electricity.rate_field(), "rate");
        assert_eq!(UtilityType::Heating.unit(), "kWh");
    }
}
