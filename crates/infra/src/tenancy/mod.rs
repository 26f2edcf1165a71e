//! Tenant isolation: the per-unit-of-work `TenantContext`, the storage
//! boundary, and the repository that scopes every query to one tenant.

pub mod context;
pub mod in_memory;
pub mod query;
pub mod records;
pub mod repository;
pub mod storage;

pub use context::TenantContext;
pub use in_memory::InMemoryStorage;
pub use query::{Direction, Filter, FilterOp, Page, Pagination, Query, TENANT_COLUMN, Value};
pub use repository::{DEFAULT_STORAGE_TIMEOUT, RepositoryError, TenantScopedRepository, UnscopedView};
pub use storage::{Record, Storage, StorageError};

pub(crate) use repository::bounded;
