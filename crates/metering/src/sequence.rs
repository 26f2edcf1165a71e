//! Reading-series rules.
//!
//! For a fixed (meter, zone) the reading values never decrease in date order.
//! Checks run against the immediate neighbours of the candidate, so a reading
//! inserted between two existing ones must fit between their values.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{Meter, MeterReading, ReadingId};

/// Decimal places a register value may carry; matches the `meter_readings.value` column.
pub const READING_SCALE: u32 = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadingError {
    #[error("reading value must not be negative (got {0})")]
    NegativeValue(Decimal),

    #[error("reading value {0} has more than {READING_SCALE} decimal places")]
    TooPrecise(Decimal),

    #[error("meter {serial} records zoned readings; a zone is required")]
    ZoneRequired { serial: String },

    #[error("meter {serial} does not support zones")]
    ZoneNotSupported { serial: String },

    #[error(
        "reading {value} on {date} breaks monotonic series (neighbour {neighbour_value} on {neighbour_date})"
    )]
    NonMonotonic {
        zone: Option<String>,
        date: NaiveDate,
        value: Decimal,
        neighbour_date: NaiveDate,
        neighbour_value: Decimal,
    },

    #[error("a reading already exists for {date} (zone: {zone:?})")]
    Duplicate { date: NaiveDate, zone: Option<String> },
}

/// Closest readings strictly before and strictly after `date` in the same zone.
///
/// `exclude` skips one reading, used when re-validating a correction.
pub fn neighbours<'a>(
    readings: &'a [MeterReading],
    zone: Option<&str>,
    date: NaiveDate,
    exclude: Option<ReadingId>,
) -> (Option<&'a MeterReading>, Option<&'a MeterReading>) {
    let series = readings
        .iter()
        .filter(|r| r.in_zone(zone) && Some(r.id) != exclude);

    let mut before: Option<&MeterReading> = None;
    let mut after: Option<&MeterReading> = None;
    for reading in series {
        if reading.reading_date < date {
            if before.is_none_or(|b| reading.reading_date > b.reading_date) {
                before = Some(reading);
            }
        } else if reading.reading_date > date
            && after.is_none_or(|a| reading.reading_date < a.reading_date)
        {
            after = Some(reading);
        }
    }
    (before, after)
}

/// Validate `candidate` against the meter and the meter's existing readings.
///
/// `existing` may contain `candidate` itself (corrections); it is skipped by id.
pub fn check_new_reading(
    meter: &Meter,
    existing: &[MeterReading],
    candidate: &MeterReading,
) -> Result<(), ReadingError> {
    if candidate.value < Decimal::ZERO {
        return Err(ReadingError::NegativeValue(candidate.value));
    }
    if candidate.value.normalize().scale() > READING_SCALE {
        return Err(ReadingError::TooPrecise(candidate.value));
    }

    match (meter.supports_zones, candidate.zone()) {
        (true, None) => {
            return Err(ReadingError::ZoneRequired {
                serial: meter.serial_number.clone(),
            });
        }
        (false, Some(_)) => {
            return Err(ReadingError::ZoneNotSupported {
                serial: meter.serial_number.clone(),
            });
        }
        _ => {}
    }

    let zone = candidate.zone();
    let duplicate = existing.iter().any(|r| {
        r.id != candidate.id && r.reading_date == candidate.reading_date && r.in_zone(zone)
    });
    if duplicate {
        return Err(ReadingError::Duplicate {
            date: candidate.reading_date,
            zone: candidate.zone.clone(),
        });
    }

    let (before, after) = neighbours(existing, zone, candidate.reading_date, Some(candidate.id));
    let breaks = |neighbour: &MeterReading| ReadingError::NonMonotonic {
        zone: candidate.zone.clone(),
        date: candidate.reading_date,
        value: candidate.value,
        neighbour_date: neighbour.reading_date,
        neighbour_value: neighbour.value,
    };

    if let Some(prev) = before {
        if candidate.value < prev.value {
            return Err(breaks(prev));
        }
    }
    if let Some(next) = after {
        if candidate.value > next.value {
            return Err(breaks(next));
        }
    }
    Ok(())
}

/// All readings taken on the latest reading date within `[date - window, date]`.
///
/// Zoned meters return one reading per zone recorded that day.
pub fn readings_on_or_before(
    readings: &[MeterReading],
    date: NaiveDate,
    window_days: u64,
) -> Vec<&MeterReading> {
    let earliest = date.checked_sub_days(Days::new(window_days)).unwrap_or(NaiveDate::MIN);
    let chosen = readings
        .iter()
        .map(|r| r.reading_date)
        .filter(|d| *d <= date && *d >= earliest)
        .max();
    readings_on(readings, chosen)
}

/// All readings taken on the earliest reading date within `[date, date + window]`.
pub fn readings_on_or_after(
    readings: &[MeterReading],
    date: NaiveDate,
    window_days: u64,
) -> Vec<&MeterReading> {
    let latest = date.checked_add_days(Days::new(window_days)).unwrap_or(NaiveDate::MAX);
    let chosen = readings
        .iter()
        .map(|r| r.reading_date)
        .filter(|d| *d >= date && *d <= latest)
        .min();
    readings_on(readings, chosen)
}

fn readings_on(readings: &[MeterReading], day: Option<NaiveDate>) -> Vec<&MeterReading> {
    match day {
        Some(day) => readings.iter().filter(|r| r.reading_date == day).collect(),
        None => Vec::new(),
    }
}
