//! Turning a meter's readings and a tariff into invoice items.
//!
//! Rating is per meter and pure: the caller selects the readings (previous
//! period boundary, current period boundary) and the tariff in force, and a
//! failure here only ever concerns this one meter.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use utilbill_core::Currency;
use utilbill_metering::{Meter, MeterReading, UtilityType};
use utilbill_tariffs::{ConfigurationError, FlatRate, Tariff, TariffConfiguration, TimeOfUse};

use crate::{InvoiceItem, ReadingSnapshot};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RatingError {
    #[error("meter {meter}: current reading {current} is below previous reading {previous}")]
    NonMonotonicConsumption {
        meter: String,
        zone: Option<String>,
        previous: Decimal,
        current: Decimal,
    },

    #[error("meter {meter}: {detail}")]
    ZoneMismatch { meter: String, detail: String },

    #[error("no tariff active for {utility} on {as_of}")]
    NoTariffActive { utility: UtilityType, as_of: NaiveDate },

    #[error("meter {meter}: missing {which} reading")]
    MissingReading { meter: String, which: &'static str },

    #[error("invalid tariff configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<ConfigurationError> for RatingError {
    fn from(err: ConfigurationError) -> Self {
        RatingError::InvalidConfiguration(err.to_string())
    }
}

/// Items produced for one meter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RatedMeter {
    pub items: Vec<InvoiceItem>,
    /// Declared zones without both a previous and a current reading.
    pub skipped_zones: Vec<String>,
}

#[derive(Debug, Copy, Clone)]
pub struct ConsumptionRater {
    currency: Currency,
}

impl ConsumptionRater {
    pub fn new(currency: Currency) -> Self {
        Self { currency }
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Rate one meter.
    ///
    /// `previous` and `current` are the readings taken on the two boundary
    /// dates (one per zone for zoned meters).
    pub fn rate(
        &self,
        meter: &Meter,
        previous: &[MeterReading],
        current: &[MeterReading],
        tariff: &Tariff,
    ) -> Result<RatedMeter, RatingError> {
        match (&tariff.configuration, meter.supports_zones) {
            (TariffConfiguration::Flat(flat), false) => self.rate_flat(meter, previous, current, tariff, flat),
            (TariffConfiguration::TimeOfUse(tou), true) => self.rate_zoned(meter, previous, current, tariff, tou),
            (TariffConfiguration::Flat(_), true) => Err(mismatch(
                meter,
                format!("zoned meter cannot be rated against flat tariff '{}'", tariff.name),
            )),
            (TariffConfiguration::TimeOfUse(_), false) => Err(mismatch(
                meter,
                format!("single-register meter cannot be rated against time-of-use tariff '{}'", tariff.name),
            )),
        }
    }

    fn rate_flat(
        &self,
        meter: &Meter,
        previous: &[MeterReading],
        current: &[MeterReading],
        tariff: &Tariff,
        flat: &FlatRate,
    ) -> Result<RatedMeter, RatingError> {
        if let Some(zoned) = previous.iter().chain(current).find(|r| r.zone.is_some()) {
            return Err(mismatch(
                meter,
                format!("reading tagged with zone '{}' on a meter without zones", zoned.zone().unwrap_or_default()),
            ));
        }
        let prev = previous.first().ok_or_else(|| missing(meter, "previous"))?;
        let curr = current.first().ok_or_else(|| missing(meter, "current"))?;
        let consumption = consumption(meter, None, prev, curr)?;

        let item = InvoiceItem::priced(
            meter.utility.label(),
            consumption,
            meter.utility.unit(),
            flat.unit_price(),
            flat.fixed_fee,
            self.currency,
        )
        .with_snapshot(snapshot(meter, None, prev, curr, tariff));

        Ok(RatedMeter {
            items: vec![item],
            skipped_zones: Vec::new(),
        })
    }

    fn rate_zoned(
        &self,
        meter: &Meter,
        previous: &[MeterReading],
        current: &[MeterReading],
        tariff: &Tariff,
        tou: &TimeOfUse,
    ) -> Result<RatedMeter, RatingError> {
        for reading in previous.iter().chain(current) {
            match reading.zone() {
                Some(zone) if tou.declares(zone) => {}
                Some(zone) => {
                    return Err(mismatch(
                        meter,
                        format!("zone '{zone}' is not declared by tariff '{}'", tariff.name),
                    ));
                }
                None => return Err(mismatch(meter, "zoned meter has a reading without a zone")),
            }
        }

        let mut rated = RatedMeter::default();
        for zone in &tou.zones {
            let prev = previous.iter().find(|r| r.in_zone(Some(&zone.id)));
            let curr = current.iter().find(|r| r.in_zone(Some(&zone.id)));
            let (Some(prev), Some(curr)) = (prev, curr) else {
                rated.skipped_zones.push(zone.id.clone());
                continue;
            };

            let consumption = consumption(meter, Some(&zone.id), prev, curr)?;
            let item = InvoiceItem::priced(
                format!("{} ({})", meter.utility.label(), zone.id),
                consumption,
                meter.utility.unit(),
                zone.rate,
                Decimal::ZERO,
                self.currency,
            )
            .with_snapshot(snapshot(meter, Some(&zone.id), prev, curr, tariff));
            rated.items.push(item);
        }

        if rated.items.is_empty() {
            return Err(missing(meter, "zone"));
        }

        if tou.fixed_fee > Decimal::ZERO {
            rated.items.push(InvoiceItem::priced(
                format!("{} (fixed fee)", meter.utility.label()),
                Decimal::ONE,
                "fee",
                Decimal::ZERO,
                tou.fixed_fee,
                self.currency,
            ));
        }

        Ok(rated)
    }
}

fn consumption(
    meter: &Meter,
    zone: Option<&str>,
    prev: &MeterReading,
    curr: &MeterReading,
) -> Result<Decimal, RatingError> {
    let consumption = curr.value - prev.value;
    if consumption < Decimal::ZERO {
        return Err(RatingError::NonMonotonicConsumption {
            meter: meter.serial_number.clone(),
            zone: zone.map(str::to_string),
            previous: prev.value,
            current: curr.value,
        });
    }
    Ok(consumption)
}

fn snapshot(
    meter: &Meter,
    zone: Option<&str>,
    prev: &MeterReading,
    curr: &MeterReading,
    tariff: &Tariff,
) -> ReadingSnapshot {
    ReadingSnapshot {
        meter_id: meter.id,
        meter_serial: meter.serial_number.clone(),
        zone: zone.map(str::to_string),
        previous_value: prev.value,
        previous_date: prev.reading_date,
        current_value: curr.value,
        current_date: curr.reading_date,
        tariff_id: tariff.id,
        tariff_name: tariff.name.clone(),
    }
}

fn mismatch(meter: &Meter, detail: impl Into<String>) -> RatingError {
    RatingError::ZoneMismatch {
        meter: meter.serial_number.clone(),
        detail: detail.into(),
    }
}

fn missing(meter: &Meter, which: &'static str) -> RatingError {
    RatingError::MissingReading {
        meter: meter.serial_number.clone(),
        which,
    }
}
