use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use utilbill_core::{DomainError, TenantId, entity_id, tenant_owned_record};

use crate::{ProviderId, TariffConfiguration};

entity_id!(
    /// Tariff identifier.
    TariffId
);

/// A provider's pricing, valid over `[active_from, active_until)`.
///
/// An open-ended tariff (`active_until = None`) stays active until a later
/// window is set for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tariff {
    pub id: TariffId,
    pub tenant_id: Option<TenantId>,
    pub provider_id: ProviderId,
    pub name: String,
    pub configuration: TariffConfiguration,
    pub active_from: NaiveDate,
    pub active_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Tariff {
    pub fn new(
        provider_id: ProviderId,
        name: impl Into<String>,
        configuration: TariffConfiguration,
        active_from: NaiveDate,
        active_until: Option<NaiveDate>,
    ) -> Result<Self, DomainError> {
        if let Some(until) = active_until {
            if until <= active_from {
                return Err(DomainError::validation(format!(
                    "tariff window is empty: {active_from}..{until}"
                )));
            }
        }
        Ok(Self {
            id: TariffId::new(),
            tenant_id: None,
            provider_id,
            name: name.into(),
            configuration,
            active_from,
            active_until,
            created_at: Utc::now(),
        })
    }

    pub fn is_active_at(&self, as_of: NaiveDate) -> bool {
        as_of >= self.active_from && self.active_until.is_none_or(|until| as_of < until)
    }

    /// Half-open window intersection.
    pub fn overlaps(&self, other: &Tariff) -> bool {
        let starts_before_other_ends = other.active_until.is_none_or(|u| self.active_from < u);
        let other_starts_before_self_ends = self.active_until.is_none_or(|u| other.active_from < u);
        starts_before_other_ends && other_starts_before_self_ends
    }
}

tenant_owned_record!(Tariff, TariffId, "tariffs");
