use serde::{Deserialize, Serialize};

use utilbill_core::{TenantId, UserId};

use crate::Role;

/// An authenticated principal as handed to the core by the outer layers.
///
/// The core trusts these values verbatim; validating them is the job of the
/// authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    /// Organization the principal belongs to. `None` for platform superadmins.
    pub tenant_id: Option<TenantId>,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role, tenant_id: Option<TenantId>) -> Self {
        Self {
            user_id,
            role,
            tenant_id,
        }
    }

    pub fn superadmin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Superadmin, None)
    }

    pub fn manager(user_id: UserId, tenant_id: TenantId) -> Self {
        Self::new(user_id, Role::Manager, Some(tenant_id))
    }

    pub fn is_superadmin(&self) -> bool {
        self.role == Role::Superadmin
    }
}
