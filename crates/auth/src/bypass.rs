use thiserror::Error;

use utilbill_core::UserId;

use crate::Principal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{0}' may not bypass tenant scoping")]
    BypassForbidden(String),

    #[error("a reason is required to bypass tenant scoping")]
    MissingReason,
}

/// Proof that a superadmin asked to step outside tenant scoping, and why.
///
/// Only `ScopeBypass::authorize` can construct one, so any repository method
/// that takes a `&ScopeBypass` is reachable solely from superadmin code paths.
/// The reason travels with the grant into the audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeBypass {
    actor: UserId,
    reason: String,
}

impl ScopeBypass {
    pub fn authorize(principal: &Principal, reason: impl Into<String>) -> Result<Self, AuthzError> {
        if !principal.role.can_bypass_tenant_scope() {
            tracing::warn!(
                user_id = %principal.user_id,
                role = %principal.role,
                "tenant scope bypass denied"
            );
            return Err(AuthzError::BypassForbidden(principal.role.to_string()));
        }

        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(AuthzError::MissingReason);
        }

        Ok(Self {
            actor: principal.user_id,
            reason,
        })
    }

    pub fn actor(&self) -> UserId {
        self.actor
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}
