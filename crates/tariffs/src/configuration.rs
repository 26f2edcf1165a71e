use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use utilbill_metering::UtilityType;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("tariff configuration must be a JSON object")]
    NotAnObject,

    #[error("unknown tariff type '{0}'")]
    UnknownType(String),

    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("time-of-use tariff declares no zones")]
    NoZones,

    #[error("zone '{0}' is declared more than once")]
    DuplicateZone(String),
}

impl ConfigurationError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// What happens to consumption timestamps that fall on a Saturday or Sunday.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekendLogic {
    /// Use the zone with id `night`.
    ApplyNightRate,
    /// Use the zone with id `day`.
    ApplyDayRate,
    /// Use the zone with id `weekend`.
    ApplyWeekendRate,
}

impl WeekendLogic {
    fn zone_id(self) -> &'static str {
        match self {
            WeekendLogic::ApplyNightRate => "night",
            WeekendLogic::ApplyDayRate => "day",
            WeekendLogic::ApplyWeekendRate => "weekend",
        }
    }
}

impl FromStr for WeekendLogic {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply_night_rate" => Ok(WeekendLogic::ApplyNightRate),
            "apply_day_rate" => Ok(WeekendLogic::ApplyDayRate),
            "apply_weekend_rate" => Ok(WeekendLogic::ApplyWeekendRate),
            other => Err(ConfigurationError::invalid(
                "weekend_logic",
                format!("unknown value '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffZone {
    pub id: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub rate: Decimal,
}

impl TariffZone {
    /// `start..end`, wrapping past midnight when `end <= start`.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start < self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRate {
    pub rate: Decimal,
    /// Second per-unit component (water sewage); zero when not configured.
    #[serde(default)]
    pub surcharge_rate: Decimal,
    #[serde(default)]
    pub fixed_fee: Decimal,
}

impl FlatRate {
    pub fn unit_price(&self) -> Decimal {
        self.rate + self.surcharge_rate
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfUse {
    pub zones: Vec<TariffZone>,
    #[serde(default)]
    pub weekend_logic: Option<WeekendLogic>,
    #[serde(default)]
    pub fixed_fee: Decimal,
}

impl TimeOfUse {
    pub fn zone(&self, id: &str) -> Option<&TariffZone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn declares(&self, id: &str) -> bool {
        self.zone(id).is_some()
    }

    /// Zone that applies at a given local date-time.
    ///
    /// Weekends use the zone named by `weekend_logic` when the tariff declares
    /// it; otherwise the time-of-day ranges decide.
    pub fn zone_at(&self, at: NaiveDateTime) -> Option<&TariffZone> {
        let weekend = matches!(at.weekday(), Weekday::Sat | Weekday::Sun);
        if weekend {
            if let Some(zone) = self.weekend_logic.and_then(|logic| self.zone(logic.zone_id())) {
                return Some(zone);
            }
        }
        self.zones.iter().find(|z| z.contains(at.time()))
    }
}

/// Parsed tariff configuration.
///
/// Persisted in this canonical serde form; [`TariffConfiguration::from_json`]
/// is the only way in from admin-entered JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TariffConfiguration {
    Flat(FlatRate),
    TimeOfUse(TimeOfUse),
}

impl TariffConfiguration {
    /// Parse admin-entered configuration for a tariff billing `utility`.
    ///
    /// Flat tariffs name their rate after the utility's service
    /// (`supply_rate` + optional `sewage_rate` for water, `rate` otherwise).
    /// When `type` is absent the presence of `zones` decides.
    pub fn from_json(utility: UtilityType, value: &Value) -> Result<Self, ConfigurationError> {
        let obj = value.as_object().ok_or(ConfigurationError::NotAnObject)?;

        let kind = match obj.get("type") {
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ConfigurationError::invalid("type", "expected a string")),
            None if obj.contains_key("zones") => "time_of_use".to_string(),
            None => "flat".to_string(),
        };

        let fixed_fee = non_negative(obj, "fixed_fee")?.unwrap_or(Decimal::ZERO);

        match kind.as_str() {
            "flat" => {
                let rate_field = utility.rate_field();
                let rate = non_negative(obj, rate_field)?
                    .ok_or_else(|| ConfigurationError::MissingField(rate_field.to_string()))?;
                let surcharge_rate = match utility.surcharge_field() {
                    Some(field) => non_negative(obj, field)?.unwrap_or(Decimal::ZERO),
                    None => Decimal::ZERO,
                };
                Ok(TariffConfiguration::Flat(FlatRate {
                    rate,
                    surcharge_rate,
                    fixed_fee,
                }))
            }
            "time_of_use" => {
                let zones = parse_zones(obj)?;
                let weekend_logic = match obj.get("weekend_logic") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.parse()?),
                    Some(_) => {
                        return Err(ConfigurationError::invalid("weekend_logic", "expected a string"));
                    }
                };
                Ok(TariffConfiguration::TimeOfUse(TimeOfUse {
                    zones,
                    weekend_logic,
                    fixed_fee,
                }))
            }
            other => Err(ConfigurationError::UnknownType(other.to_string())),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn is_zoned(&self) -> bool {
        matches!(self, TariffConfiguration::TimeOfUse(_))
    }

    pub fn fixed_fee(&self) -> Decimal {
        match self {
            TariffConfiguration::Flat(flat) => flat.fixed_fee,
            TariffConfiguration::TimeOfUse(tou) => tou.fixed_fee,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TariffConfiguration::Flat(_) => "flat",
            TariffConfiguration::TimeOfUse(_) => "time_of_use",
        }
    }
}

fn parse_zones(obj: &Map<String, Value>) -> Result<Vec<TariffZone>, ConfigurationError> {
    let raw = match obj.get("zones") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ConfigurationError::invalid("zones", "expected an array")),
        None => return Err(ConfigurationError::MissingField("zones".into())),
    };
    if raw.is_empty() {
        return Err(ConfigurationError::NoZones);
    }

    let mut zones: Vec<TariffZone> = Vec::with_capacity(raw.len());
    for (i, item) in raw.iter().enumerate() {
        let zone = item
            .as_object()
            .ok_or_else(|| ConfigurationError::invalid(format!("zones[{i}]"), "expected an object"))?;

        let id = match zone.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(ConfigurationError::MissingField(format!("zones[{i}].id"))),
        };
        if zones.iter().any(|z| z.id == id) {
            return Err(ConfigurationError::DuplicateZone(id));
        }

        let start = time_field(zone, i, "start")?;
        let end = time_field(zone, i, "end")?;
        if start == end {
            return Err(ConfigurationError::invalid(
                format!("zones[{i}]"),
                "start and end must differ",
            ));
        }
        let rate = non_negative(zone, "rate")?
            .ok_or_else(|| ConfigurationError::MissingField(format!("zones[{i}].rate")))?;

        zones.push(TariffZone { id, start, end, rate });
    }
    Ok(zones)
}

fn time_field(zone: &Map<String, Value>, i: usize, name: &str) -> Result<NaiveTime, ConfigurationError> {
    let field = format!("zones[{i}].{name}");
    let raw = zone
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigurationError::MissingField(field.clone()))?;
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| ConfigurationError::invalid(field, format!("'{raw}' is not HH:MM")))
}

/// Reads a decimal from a JSON number or numeric string without going through f64.
fn non_negative(obj: &Map<String, Value>, name: &str) -> Result<Option<Decimal>, ConfigurationError> {
    let text = match obj.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err(ConfigurationError::invalid(name, "expected a number")),
    };
    let value = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| ConfigurationError::invalid(name, format!("'{text}' is not a decimal")))?;
    if value < Decimal::ZERO {
        return Err(ConfigurationError::invalid(name, "must not be negative"));
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn day_night(weekend: Option<&str>) -> TimeOfUse {
        let mut raw = json!({
            "type": "time_of_use",
            "zones": [
                { "id": "day", "start": "07:00", "end": "23:00", "rate": 0.20 },
                { "id": "night", "start": "23:00", "end": "07:00", "rate": 0.10 }
            ]
        });
        if let Some(logic) = weekend {
            raw["weekend_logic"] = json!(logic);
        }
        match TariffConfiguration::from_json(UtilityType::Electricity, &raw).unwrap() {
            TariffConfiguration::TimeOfUse(tou) => tou,
            other => panic!("expected time of use, got {other:?}"),
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn water_flat_reads_supply_and_sewage_rates() {
        let raw = json!({ "type": "flat", "supply_rate": 0.97, "sewage_rate": 1.23, "fixed_fee": 0.85 });
        let parsed = TariffConfiguration::from_json(UtilityType::ColdWater, &raw).unwrap();
        assert_eq!(
            parsed,
            TariffConfiguration::Flat(FlatRate {
                rate: dec!(0.97),
                surcharge_rate: dec!(1.23),
                fixed_fee: dec!(0.85),
            })
        );
    }

    #[test]
    fn electricity_flat_requires_rate_not_supply_rate() {
        let raw = json!({ "type": "flat", "supply_rate": 0.97 });
        assert_eq!(
            TariffConfiguration::from_json(UtilityType::Electricity, &raw),
            Err(ConfigurationError::MissingField("rate".into()))
        );
    }

    #[test]
    fn decimals_are_parsed_exactly() {
        let raw = json!({ "rate": "0.1234", "fixed_fee": 2 });
        let parsed = TariffConfiguration::from_json(UtilityType::Heating, &raw).unwrap();
        assert_eq!(parsed.fixed_fee(), dec!(2));
        assert!(!parsed.is_zoned());
    }

    #[test]
    fn rejects_negative_rates_and_duplicate_zones() {
        let negative = json!({ "rate": -0.1 });
        assert!(matches!(
            TariffConfiguration::from_json(UtilityType::Electricity, &negative),
            Err(ConfigurationError::InvalidField { .. })
        ));

        let dup = json!({ "zones": [
            { "id": "day", "start": "07:00", "end": "23:00", "rate": 0.2 },
            { "id": "day", "start": "23:00", "end": "07:00", "rate": 0.1 }
        ]});
        assert_eq!(
            TariffConfiguration::from_json(UtilityType::Electricity, &dup),
            Err(ConfigurationError::DuplicateZone("day".into()))
        );
    }

    #[test]
    fn canonical_form_survives_storage() {
        let tou = TariffConfiguration::TimeOfUse(day_night(Some("apply_night_rate")));
        let stored = tou.to_json();
        assert_eq!(stored["type"], "time_of_use");
        let back: TariffConfiguration = serde_json::from_value(stored).unwrap();
        assert_eq!(back, tou);
    }

    #[test]
    fn zone_lookup_wraps_past_midnight() {
        let tou = day_night(None);
        // 2025-01-15 is a Wednesday.
        assert_eq!(tou.zone_at(at(2025, 1, 15, 12, 0)).unwrap().id, "day");
        assert_eq!(tou.zone_at(at(2025, 1, 15, 23, 30)).unwrap().id, "night");
        assert_eq!(tou.zone_at(at(2025, 1, 15, 3, 0)).unwrap().id, "night");
        assert_eq!(tou.zone_at(at(2025, 1, 15, 7, 0)).unwrap().id, "day");
    }

    #[test]
    fn weekend_logic_overrides_time_ranges() {
        // 2025-01-18 is a Saturday, 2025-01-19 a Sunday.
        let night = day_night(Some("apply_night_rate"));
        assert_eq!(night.zone_at(at(2025, 1, 18, 12, 0)).unwrap().id, "night");
        assert_eq!(night.zone_at(at(2025, 1, 19, 12, 0)).unwrap().id, "night");

        let day = day_night(Some("apply_day_rate"));
        assert_eq!(day.zone_at(at(2025, 1, 18, 2, 0)).unwrap().id, "day");

        let none = day_night(None);
        assert_eq!(none.zone_at(at(2025, 1, 18, 12, 0)).unwrap().id, "day");
    }

    #[test]
    fn dedicated_weekend_zone() {
        let raw = json!({
            "zones": [
                { "id": "day", "start": "07:00", "end": "23:00", "rate": 0.20 },
                { "id": "night", "start": "23:00", "end": "07:00", "rate": 0.10 },
                { "id": "weekend", "start": "00:00", "end": "23:59", "rate": 0.12 }
            ],
            "weekend_logic": "apply_weekend_rate"
        });
        let TariffConfiguration::TimeOfUse(tou) =
            TariffConfiguration::from_json(UtilityType::Electricity, &raw).unwrap()
        else {
            panic!("expected time of use");
        };
        let zone = tou.zone_at(at(2025, 1, 19, 9, 0)).unwrap();
        assert_eq!(zone.id, "weekend");
        assert_eq!(zone.rate, dec!(0.12));
        assert_eq!(tou.zone_at(at(2025, 1, 20, 9, 0)).unwrap().id, "day");
    }
}
