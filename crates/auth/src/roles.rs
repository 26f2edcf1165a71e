use serde::{Deserialize, Serialize};

/// Platform roles, ordered from widest to narrowest reach.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator; not bound to any tenant.
    Superadmin,
    /// Organization administrator.
    Admin,
    /// Organization staff managing properties, readings and invoices.
    Manager,
    /// A renter logged into the tenant portal.
    Tenant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Tenant => "tenant",
        }
    }

    /// Only platform operators may bypass tenant scoping.
    pub fn can_bypass_tenant_scope(self) -> bool {
        matches!(self, Role::Superadmin)
    }

    /// Whether this role is expected to carry a tenant id.
    pub fn is_tenant_bound(self) -> bool {
        !matches!(self, Role::Superadmin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
