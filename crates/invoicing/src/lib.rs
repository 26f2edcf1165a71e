//! Invoicing domain module.
//!
//! Business rules for utility invoices: the Draft → Finalized → Paid lifecycle
//! consumption rating and the building circulation fee. Deterministic domain logic only (no IO, no storage).

pub mod circulation;
pub mod invoice;
pub mod item;
pub mod rating;

pub use circulation::{CIRCULATION_DESCRIPTION, CirculationCalculator, CirculationError, CirculationSettings, Season};
pub use invoice::{
    CreateDraft, DraftCreated, Invoice, InvoiceCommand, InvoiceError, InvoiceEvent, InvoiceId,
    InvoiceStatus,
};
pub use item::{InvoiceItem, ItemId, ItemUpdate, ReadingSnapshot};
pub use rating::{ConsumptionRater, RatedMeter, RatingError};
