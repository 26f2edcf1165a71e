//! `utilbill-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::{Entity, TenantOwned};
pub use error::{DomainError, DomainResult};
pub use id::{TenantId, UserId};
pub use money::{round_money, Currency};
