//! Entity traits: identity plus tenant ownership.

use crate::TenantId;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy
        + Eq
        + core::hash::Hash
        + core::fmt::Debug
        + Send
        + Sync
        + Into<uuid::Uuid>
        + 'static;

    /// Stable entity name; used as the table name and in audit records.
    const ENTITY: &'static str;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}

/// An entity that belongs to exactly one tenant.
///
/// Every persisted record in the billing core implements this. The tenant column
/// is what the scoped repository filters on and stamps on insert; domain code
/// never sets it directly.
pub trait TenantOwned: Entity {
    /// Tenant the record belongs to, `None` until it has been stamped.
    fn tenant_id(&self) -> Option<TenantId>;

    /// Stamp the owning tenant. Called by the repository right before insert.
    fn assign_tenant(&mut self, tenant_id: TenantId);
}

/// Implements `Entity` + `TenantOwned` for a record with `id` and
/// `tenant_id: Option<TenantId>` fields.
#[macro_export]
macro_rules! tenant_owned_record {
    ($t:ty, $id:ty, $entity:literal) => {
        impl $crate::Entity for $t {
            type Id = $id;
            const ENTITY: &'static str = $entity;

            fn id(&self) -> Self::Id {
                self.id
            }
        }

        impl $crate::TenantOwned for $t {
            fn tenant_id(&self) -> Option<$crate::TenantId> {
                self.tenant_id
            }

            fn assign_tenant(&mut self, tenant_id: $crate::TenantId) {
                self.tenant_id = Some(tenant_id);
            }
        }
    };
}
