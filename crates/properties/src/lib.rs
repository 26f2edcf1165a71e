//! Organizations and the real estate they bill for.
//!
//! Plain tenant-owned records; persistence and scoping live in `utilbill-infra`.

pub mod organization;
pub mod property;

pub use organization::Organization;
pub use property::{Building, BuildingId, Property, PropertyId, PropertyKind, Renter, RenterId};
