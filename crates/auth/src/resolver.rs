use utilbill_core::TenantId;

use crate::Principal;

/// Supplies the "current tenant" when a unit of work has not set one explicitly.
///
/// Injected once at the request/job boundary. Implementations must be cheap
/// and side-effect free; they are consulted on every context lookup.
pub trait CurrentTenantResolver: Send + Sync + core::fmt::Debug {
    fn current_tenant(&self) -> Option<TenantId>;
}

/// Resolves the tenant from an authenticated principal.
#[derive(Debug, Clone)]
pub struct PrincipalTenantResolver {
    principal: Principal,
}

impl PrincipalTenantResolver {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

impl CurrentTenantResolver for PrincipalTenantResolver {
    fn current_tenant(&self) -> Option<TenantId> {
        self.principal.tenant_id
    }
}

/// Always resolves to the same tenant (jobs, tests).
#[derive(Debug, Copy, Clone)]
pub struct FixedTenantResolver(pub Option<TenantId>);

impl CurrentTenantResolver for FixedTenantResolver {
    fn current_tenant(&self) -> Option<TenantId> {
        self.0
    }
}
