//! Hot-water circulation fee ("gyvatukas"), charged per building.
//!
//! Summer months bill `apartments * rate_per_apartment`. Heating months scale
//! the building's summer average by a seasonal factor, falling back to the
//! summer base when no average was measured. Both are then adjusted for
//! building size.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use thiserror::Error;

use utilbill_core::Currency;
use utilbill_properties::Building;

use crate::InvoiceItem;

pub const CIRCULATION_DESCRIPTION: &str = "Hot water circulation";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CirculationError {
    #[error("building {building}: apartment count {apartments} outside 1..={max}")]
    InvalidApartmentCount { building: String, apartments: u32, max: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Season {
    Summer,
    Heating,
}

/// Seasonal and size factors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CirculationSettings {
    /// kWh per apartment per summer month.
    pub rate_per_apartment: Decimal,
    pub summer_months: Vec<u32>,
    pub peak_winter_months: Vec<u32>,
    pub peak_winter_factor: Decimal,
    pub shoulder_months: Vec<u32>,
    pub shoulder_factor: Decimal,
    /// Heating months that are neither peak nor shoulder.
    pub winter_factor: Decimal,
    /// Buildings with more apartments than this get `large_building_factor`.
    pub large_building_threshold: u32,
    pub large_building_factor: Decimal,
    /// Buildings with fewer apartments than this get `small_building_factor`.
    pub small_building_threshold: u32,
    pub small_building_factor: Decimal,
    pub max_apartments: u32,
}

impl Default for CirculationSettings {
    fn default() -> Self {
        Self {
            rate_per_apartment: Decimal::new(15, 0),
            summer_months: vec![5, 6, 7, 8, 9],
            peak_winter_months: vec![12, 1, 2],
            peak_winter_factor: Decimal::new(130, 2),
            shoulder_months: vec![10, 11, 3, 4],
            shoulder_factor: Decimal::new(115, 2),
            winter_factor: Decimal::new(120, 2),
            large_building_threshold: 50,
            large_building_factor: Decimal::new(95, 2),
            small_building_threshold: 10,
            small_building_factor: Decimal::new(110, 2),
            max_apartments: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CirculationCalculator {
    settings: CirculationSettings,
    currency: Currency,
}

impl CirculationCalculator {
    pub fn new(settings: CirculationSettings, currency: Currency) -> Self {
        Self { settings, currency }
    }

    pub fn season(&self, month: NaiveDate) -> Season {
        if self.settings.summer_months.contains(&month.month()) {
            Season::Summer
        } else {
            Season::Heating
        }
    }

    fn size_factor(&self, apartments: u32) -> Decimal {
        let s = &self.settings;
        if apartments > s.large_building_threshold {
            s.large_building_factor
        } else if apartments < s.small_building_threshold {
            s.small_building_factor
        } else {
            Decimal::ONE
        }
    }

    fn heating_factor(&self, month: NaiveDate) -> Decimal {
        let s = &self.settings;
        let m = month.month();
        if s.peak_winter_months.contains(&m) {
            s.peak_winter_factor
        } else if s.shoulder_months.contains(&m) {
            s.shoulder_factor
        } else {
            s.winter_factor
        }
    }

    /// Circulation energy (kWh) of `building` for the month containing `month`.
    pub fn energy(&self, building: &Building, month: NaiveDate) -> Result<Decimal, CirculationError> {
        let apartments = building.apartments;
        if apartments == 0 || apartments > self.settings.max_apartments {
            return Err(CirculationError::InvalidApartmentCount {
                building: building.name.clone(),
                apartments,
                max: self.settings.max_apartments,
            });
        }

        let summer_base = Decimal::from(apartments) * self.settings.rate_per_apartment;
        let base = match self.season(month) {
            Season::Summer => summer_base,
            Season::Heating => {
                building.circulation_summer_average.unwrap_or(summer_base) * self.heating_factor(month)
            }
        };
        Ok((base * self.size_factor(apartments)).max(Decimal::ZERO))
    }

    /// The monthly circulation item, or `None` when there is nothing to charge.
    pub fn item(&self, building: &Building, month: NaiveDate) -> Result<Option<InvoiceItem>, CirculationError> {
        let energy = self.energy(building, month)?;
        if energy <= Decimal::ZERO {
            return Ok(None);
        }
        Ok(Some(InvoiceItem::priced(
            CIRCULATION_DESCRIPTION,
            Decimal::ONE,
            "month",
            self.currency.round(energy),
            Decimal::ZERO,
            self.currency,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn month(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, 1).unwrap()
    }

    fn calculator() -> CirculationCalculator {
        CirculationCalculator::new(CirculationSettings::default(), Currency::Eur)
    }

    #[test]
    fn summer_is_apartments_times_rate() {
        let building = Building::new("Linden 4", "Linden g. 4", 20);
        assert_eq!(calculator().season(month(7)), Season::Summer);
        assert_eq!(calculator().energy(&building, month(7)).unwrap(), dec!(300));
    }

    #[test]
    fn heating_months_scale_the_summer_average() {
        let building = Building::new("Linden 4", "Linden g. 4", 20).with_summer_average(dec!(150));
        let calc = calculator();

        assert_eq!(calc.energy(&building, month(1)).unwrap(), dec!(195.0));
        assert_eq!(calc.energy(&building, month(10)).unwrap(), dec!(172.50));

        let unmeasured = Building::new("Linden 6", "Linden g. 6", 20);
        assert_eq!(calc.energy(&unmeasured, month(12)).unwrap(), dec!(390.0));
    }

    #[test]
    fn building_size_adjusts_the_result() {
        let calc = calculator();
        let small = Building::new("Cottage row", "Sodu g. 1", 8);
        assert_eq!(calc.energy(&small, month(7)).unwrap(), dec!(132.0));

        let large = Building::new("Tower", "Vilniaus g. 100", 60);
        assert_eq!(calc.energy(&large, month(3)).unwrap(), dec!(983.25));
    }

    #[test]
    fn apartment_count_must_be_plausible() {
        let calc = calculator();
        let empty = Building::new("Shell", "Nowhere 0", 0);
        assert!(matches!(
            calc.energy(&empty, month(7)),
            Err(CirculationError::InvalidApartmentCount { apartments: 0, .. })
        ));
        let huge = Building::new("Block", "Big 1", 1001);
        assert!(calc.item(&huge, month(7)).is_err());
    }

    #[test]
    fn item_is_one_month_at_the_rounded_amount() {
        let building = Building::new("Tower", "Vilniaus g. 100", 60);
        let item = calculator().item(&building, month(3)).unwrap().unwrap();
        assert_eq!(item.description, CIRCULATION_DESCRIPTION);
        assert_eq!(item.quantity, dec!(1));
        assert_eq!(item.unit, "month");
        assert_eq!(item.total(), dec!(983.25));
        assert!(item.snapshot.is_none());
    }
}
