//! Meters, meter readings and the rules readings must obey.
//!
//! Pure domain logic. Readings are validated against their neighbours before
//! they are written; the billing engine relies on the resulting monotonic
//! series per (meter, zone).

pub mod meter;
pub mod sequence;
pub mod utility;

pub use meter::{Meter, MeterId, MeterReading, ReadingId};
pub use sequence::{
    READING_SCALE, ReadingError, check_new_reading, neighbours, readings_on_or_after, readings_on_or_before,
};
pub use utility::{ServiceType, UtilityType};
