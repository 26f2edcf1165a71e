use std::sync::Arc;

use utilbill_auth::CurrentTenantResolver;
use utilbill_core::TenantId;

use super::RepositoryError;

/// The tenant a unit of work (request, job, test) operates in.
///
/// Passed explicitly into every repository call; there is no process-wide
/// current tenant. An explicitly set tenant wins over the injected resolver.
#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    explicit: Option<TenantId>,
    resolver: Option<Arc<dyn CurrentTenantResolver>>,
}

impl TenantContext {
    /// Context with no tenant and no resolver.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context explicitly bound to `tenant_id`.
    pub fn for_tenant_id(tenant_id: TenantId) -> Self {
        Self {
            explicit: Some(tenant_id),
            resolver: None,
        }
    }

    /// Context that falls back to `resolver` when nothing is set explicitly.
    pub fn with_resolver(resolver: Arc<dyn CurrentTenantResolver>) -> Self {
        Self {
            explicit: None,
            resolver: Some(resolver),
        }
    }

    pub fn set(&mut self, tenant_id: TenantId) {
        self.explicit = Some(tenant_id);
    }

    pub fn clear(&mut self) {
        self.explicit = None;
    }

    /// Active tenant, or `None` when neither an explicit tenant nor the
    /// resolver provides one. "No tenant" is a state, not an error.
    pub fn get(&self) -> Option<TenantId> {
        self.explicit
            .or_else(|| self.resolver.as_ref().and_then(|r| r.current_tenant()))
    }

    /// Copy of this context bound to another tenant; `self` is untouched.
    pub fn for_tenant(&self, tenant_id: TenantId) -> Self {
        Self {
            explicit: Some(tenant_id),
            resolver: self.resolver.clone(),
        }
    }

    pub fn require(&self) -> Result<TenantId, RepositoryError> {
        self.get().ok_or_else(|| {
            tracing::error!("tenant-scoped operation attempted without a tenant context");
            RepositoryError::TenantContextMissing
        })
    }
}
