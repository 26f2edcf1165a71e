use serde::{Deserialize, Serialize};

use utilbill_core::{TenantId, entity_id, tenant_owned_record};
use utilbill_metering::ServiceType;

entity_id!(
    /// Utility provider identifier.
    ProviderId
);

/// A utility company supplying one service to an organization's properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub service: ServiceType,
}

impl Provider {
    pub fn new(name: impl Into<String>, service: ServiceType) -> Self {
        Self {
            id: ProviderId::new(),
            tenant_id: None,
            name: name.into(),
            service,
        }
    }
}

tenant_owned_record!(Provider, ProviderId, "providers");
