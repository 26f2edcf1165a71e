//! Picking the tariff in force on a date, and keeping windows disjoint.

use chrono::NaiveDate;
use thiserror::Error;

use crate::{Tariff, TariffId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TariffError {
    #[error("tariff window overlaps existing tariff {existing} ({name})")]
    Overlap { existing: TariffId, name: String },
}

/// The tariff whose window contains `as_of`; the most recently started wins.
///
/// Ties on `active_from` fall back to the newest record so a re-issued tariff
/// supersedes the one it replaces.
pub fn select_active(tariffs: &[Tariff], as_of: NaiveDate) -> Option<&Tariff> {
    tariffs
        .iter()
        .filter(|t| t.is_active_at(as_of))
        .max_by(|a, b| {
            a.active_from
                .cmp(&b.active_from)
                .then(a.created_at.cmp(&b.created_at))
        })
}

/// Reject `candidate` if its window intersects any other tariff of the same provider.
pub fn ensure_no_overlap(existing: &[Tariff], candidate: &Tariff) -> Result<(), TariffError> {
    let clash = existing.iter().find(|t| {
        t.id != candidate.id && t.provider_id == candidate.provider_id && t.overlaps(candidate)
    });
    match clash {
        Some(t) => Err(TariffError::Overlap {
            existing: t.id,
            name: t.name.clone(),
        }),
        None => Ok(()),
    }
}
