//! Errors raised by the billing value types themselves.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// A value rejected before it reaches storage.
///
/// Lifecycle, rating and storage failures are reported by the crates that own
/// them; this type only covers malformed records and stale versions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed record: blank organization name, non-positive area, empty
    /// tariff window, unknown currency code.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A tenant or entity id that is not a UUID.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The stored version moved past the one the caller read.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
