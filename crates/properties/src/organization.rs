use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use utilbill_core::{Currency, DomainError, Entity, TenantId, TenantOwned};

/// Tenant root record. Exactly one per `TenantId`; its id *is* the tenant id.
///
/// Organizations are deactivated, never hard-deleted while children exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: TenantId,
    pub name: String,
    /// BCP-47 locale tag used by presentation layers (e.g. "lt-LT").
    pub locale: String,
    pub currency: Currency,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>, locale: impl Into<String>, currency: Currency) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("organization name cannot be empty"));
        }
        Ok(Self {
            id: TenantId::new(),
            name,
            locale: locale.into(),
            currency,
            active: true,
            created_at: Utc::now(),
        })
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

impl Entity for Organization {
    type Id = TenantId;
    const ENTITY: &'static str = "organizations";

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl TenantOwned for Organization {
    fn tenant_id(&self) -> Option<TenantId> {
        Some(self.id)
    }

    fn assign_tenant(&mut self, tenant_id: TenantId) {
        self.id = tenant_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organization_is_its_own_tenant() {
        let org = Organization::new("Vilniaus Namai", "lt-LT", Currency::Eur).unwrap();
        assert_eq!(org.tenant_id(), Some(org.id));
        assert!(org.active);
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(Organization::new(" ", "en", Currency::Eur).is_err());
    }
}
