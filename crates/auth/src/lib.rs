//! `utilbill-auth`: principal boundary consumed by the billing core.
//!
//! Authentication itself happens outside the core. This crate only models what
//! the core needs from it: who is acting, in which tenant, and whether they may
//! step outside tenant scoping.

pub mod bypass;
pub mod principal;
pub mod resolver;
pub mod roles;

pub use bypass::{AuthzError, ScopeBypass};
pub use principal::Principal;
pub use resolver::{CurrentTenantResolver, FixedTenantResolver, PrincipalTenantResolver};
pub use roles::Role;
