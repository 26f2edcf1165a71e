//! Tenant-scoped repository.
//!
//! Every read and write goes through [`TenantScopedRepository::scoped`], which
//! injects `tenant_id = <active tenant>` into the query. Records of another
//! tenant are therefore indistinguishable from records that do not exist.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::instrument;

use utilbill_auth::{AuthzError, ScopeBypass};
use utilbill_core::{ExpectedVersion, TenantId};

use crate::audit::{AuditEntry, AuditKind, AuditTrail};

use super::context::TenantContext;
use super::query::{Direction, Filter, Page, Pagination, Query, TENANT_COLUMN};
use super::storage::{Record, Storage, StorageError};

/// Default bound on a single storage call.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("no tenant context is active")]
    TenantContextMissing,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("audit write failed, operation aborted: {0}")]
    AuditFailed(String),

    /// Timeout or outage; the caller may retry.
    #[error("transient storage failure: {0}")]
    TransientStorage(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, RepositoryError::Storage(StorageError::UniqueViolation(_)))
    }
}

impl From<AuthzError> for RepositoryError {
    fn from(err: AuthzError) -> Self {
        RepositoryError::Unauthorized(err.to_string())
    }
}

impl From<StorageError> for RepositoryError {
    fn from(err: StorageError) -> Self {
        if err.is_transient() {
            RepositoryError::TransientStorage(err.to_string())
        } else {
            RepositoryError::Storage(err)
        }
    }
}

/// Run a storage future under `timeout`, mapping expiry to `TransientStorage`.
pub(crate) async fn bounded<F, R>(timeout: Duration, operation: &'static str, fut: F) -> Result<R, RepositoryError>
where
    F: Future<Output = Result<R, StorageError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(RepositoryError::from),
        Err(_) => {
            tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "storage call timed out");
            Err(RepositoryError::TransientStorage(format!(
                "{operation} exceeded {}ms",
                timeout.as_millis()
            )))
        }
    }
}

/// Tenant-isolated access to one record type.
pub struct TenantScopedRepository<T: Record> {
    storage: Arc<dyn Storage<T>>,
    audit: AuditTrail,
    timeout: Duration,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for TenantScopedRepository<T> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            audit: self.audit.clone(),
            timeout: self.timeout,
            _record: PhantomData,
        }
    }
}

impl<T: Record> core::fmt::Debug for TenantScopedRepository<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TenantScopedRepository")
            .field("entity", &T::ENTITY)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<T: Record> TenantScopedRepository<T> {
    pub fn new(storage: Arc<dyn Storage<T>>, audit: AuditTrail) -> Self {
        Self {
            storage,
            audit,
            timeout: DEFAULT_STORAGE_TIMEOUT,
            _record: PhantomData,
        }
    }

    /// Bound every storage call made through this repository by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Base query for this entity restricted to the active tenant.
    pub fn scoped(&self, ctx: &TenantContext) -> Result<Query, RepositoryError> {
        let tenant = ctx.require()?;
        Ok(Query::new(T::ENTITY).filter(Filter::eq(TENANT_COLUMN, tenant)))
    }

    fn by_id(&self, ctx: &TenantContext, id: T::Id) -> Result<Query, RepositoryError> {
        Ok(self.scoped(ctx)?.filter(Filter::eq("id", id.into())))
    }

    #[instrument(skip(self, ctx), fields(entity = T::ENTITY, id = ?id), err)]
    pub async fn find_by_id(&self, ctx: &TenantContext, id: T::Id) -> Result<Option<T>, RepositoryError> {
        let query = self.by_id(ctx, id)?;
        let rows = bounded(self.timeout, "find_by_id", self.storage.fetch(&query)).await?;
        Ok(rows.into_iter().next())
    }

    /// Like `find_by_id`, but absence is an error.
    pub async fn get(&self, ctx: &TenantContext, id: T::Id) -> Result<T, RepositoryError> {
        self.find_by_id(ctx, id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(T::ENTITY, format!("{id:?}")))
    }

    pub async fn all(&self, ctx: &TenantContext) -> Result<Vec<T>, RepositoryError> {
        let query = self.scoped(ctx)?;
        bounded(self.timeout, "all", self.storage.fetch(&query)).await
    }

    /// 1-based page of this tenant's records.
    pub async fn paginate(&self, ctx: &TenantContext, page: u32, page_size: u32) -> Result<Page<T>, RepositoryError> {
        let pagination = Pagination::page(page, page_size);
        let base = self.scoped(ctx)?.order_by("id", Direction::Asc);

        let total = bounded(self.timeout, "paginate_count", self.storage.count(&base.unpaged())).await?;
        let items = bounded(
            self.timeout,
            "paginate_fetch",
            self.storage.fetch(&base.paginate(pagination)),
        )
        .await?;

        let has_more = u64::from(pagination.offset) + (items.len() as u64) < total;
        Ok(Page {
            items,
            total,
            pagination,
            has_more,
        })
    }

    pub async fn find_where(&self, ctx: &TenantContext, filters: Vec<Filter>) -> Result<Vec<T>, RepositoryError> {
        let query = self.scoped(ctx)?.filters(filters);
        bounded(self.timeout, "find_where", self.storage.fetch(&query)).await
    }

    /// Run a caller-shaped query (ordering, pagination); the tenant predicate is still added.
    pub async fn fetch(&self, ctx: &TenantContext, query: Query) -> Result<Vec<T>, RepositoryError> {
        let scoped = self.scoped(ctx)?;
        let query = Query {
            filters: scoped.filters.into_iter().chain(query.filters).collect(),
            ..query
        };
        bounded(self.timeout, "fetch", self.storage.fetch(&query)).await
    }

    pub async fn count_where(&self, ctx: &TenantContext, filters: Vec<Filter>) -> Result<u64, RepositoryError> {
        let query = self.scoped(ctx)?.filters(filters);
        bounded(self.timeout, "count", self.storage.count(&query)).await
    }

    /// Insert `record` stamped with the active tenant.
    #[instrument(skip(self, ctx, record), fields(entity = T::ENTITY, tenant_id = tracing::field::Empty), err)]
    pub async fn create(&self, ctx: &TenantContext, mut record: T) -> Result<T, RepositoryError> {
        let tenant = ctx.require()?;
        tracing::Span::current().record("tenant_id", tracing::field::display(tenant));
        record.assign_tenant(tenant);
        bounded(self.timeout, "create", self.storage.insert(&record)).await?;
        Ok(record)
    }

    /// Insert `record` for an explicitly named tenant.
    ///
    /// Superadmin only. The audit entry is written first; if it cannot be
    /// written nothing is inserted.
    #[instrument(skip(self, ctx, record, grant), fields(entity = T::ENTITY, tenant_id = %tenant), err)]
    pub async fn create_for_tenant(
        &self,
        ctx: &TenantContext,
        mut record: T,
        tenant: TenantId,
        grant: &ScopeBypass,
    ) -> Result<T, RepositoryError> {
        record.assign_tenant(tenant);

        let entry = AuditEntry::new(AuditKind::CrossTenantCreate, T::ENTITY)
            .tenant(tenant)
            .actor(grant.actor())
            .subject(record.id().into())
            .reason(grant.reason())
            .after(serde_json::to_value(&record).ok());
        let entry = match ctx.get() {
            Some(origin) if origin != tenant => entry.detail("origin_tenant", origin.to_string()),
            _ => entry,
        };
        self.audit.record(entry).await?;

        bounded(self.timeout, "create_for_tenant", self.storage.insert(&record)).await?;
        tracing::info!(actor = %grant.actor(), "cross-tenant create");
        Ok(record)
    }

    /// Replace the record with `id`. The tenant column cannot be changed.
    #[instrument(skip(self, ctx, record), fields(entity = T::ENTITY, id = ?id), err)]
    pub async fn update(&self, ctx: &TenantContext, id: T::Id, mut record: T) -> Result<T, RepositoryError> {
        let tenant = ctx.require()?;
        self.get(ctx, id).await?;
        record.assign_tenant(tenant);

        let query = self.by_id(ctx, id)?;
        let affected = bounded(self.timeout, "update", self.storage.update(&query, &record)).await?;
        if affected == 0 {
            return Err(RepositoryError::not_found(T::ENTITY, format!("{id:?}")));
        }
        Ok(record)
    }

    /// Compare-and-set on the `version` column.
    ///
    /// Returns `Ok(false)` when the stored version no longer matches
    /// `expected`; `NotFound` when the record is not visible at all.
    #[instrument(skip(self, ctx, record), fields(entity = T::ENTITY, id = ?id), err)]
    pub async fn update_if(
        &self,
        ctx: &TenantContext,
        id: T::Id,
        expected: ExpectedVersion,
        mut record: T,
    ) -> Result<bool, RepositoryError> {
        let tenant = ctx.require()?;
        self.get(ctx, id).await?;
        record.assign_tenant(tenant);

        let query = match expected {
            ExpectedVersion::Exact(version) => self.by_id(ctx, id)?.filter(Filter::eq("version", version)),
            ExpectedVersion::Any => self.by_id(ctx, id)?,
        };
        let affected = bounded(self.timeout, "update_if", self.storage.update(&query, &record)).await?;
        Ok(affected > 0)
    }

    #[instrument(skip(self, ctx), fields(entity = T::ENTITY, id = ?id), err)]
    pub async fn delete(&self, ctx: &TenantContext, id: T::Id) -> Result<(), RepositoryError> {
        let query = self.by_id(ctx, id)?;
        let affected = bounded(self.timeout, "delete", self.storage.delete(&query)).await?;
        if affected == 0 {
            return Err(RepositoryError::not_found(T::ENTITY, format!("{id:?}")));
        }
        Ok(())
    }

    /// Delete `id` only if it also satisfies `conditions`.
    ///
    /// Returns `Ok(false)` when the record exists but the conditions no longer hold.
    pub async fn delete_where(
        &self,
        ctx: &TenantContext,
        id: T::Id,
        conditions: Vec<Filter>,
    ) -> Result<bool, RepositoryError> {
        self.get(ctx, id).await?;
        let query = self.by_id(ctx, id)?.filters(conditions);
        let affected = bounded(self.timeout, "delete_where", self.storage.delete(&query)).await?;
        Ok(affected > 0)
    }

    /// Run `f` against an unscoped view of every tenant's records.
    ///
    /// Requires a superadmin grant; a `ScopeBypass` audit entry is written
    /// before `f` runs and its failure aborts the call.
    #[instrument(skip(self, grant, f), fields(entity = T::ENTITY, actor = %grant.actor()), err)]
    pub async fn without_tenant_scope<F, Fut, R>(&self, grant: &ScopeBypass, f: F) -> Result<R, RepositoryError>
    where
        F: FnOnce(UnscopedView<T>) -> Fut,
        Fut: Future<Output = Result<R, RepositoryError>>,
    {
        let entry = AuditEntry::new(AuditKind::ScopeBypass, T::ENTITY)
            .actor(grant.actor())
            .reason(grant.reason());
        self.audit.record(entry).await?;

        tracing::warn!(reason = grant.reason(), "tenant scope bypassed");
        f(UnscopedView {
            storage: self.storage.clone(),
            timeout: self.timeout,
        })
        .await
    }
}

/// Cross-tenant read access handed out by `without_tenant_scope`.
pub struct UnscopedView<T: Record> {
    storage: Arc<dyn Storage<T>>,
    timeout: Duration,
}

impl<T: Record> UnscopedView<T> {
    pub async fn all(&self) -> Result<Vec<T>, RepositoryError> {
        bounded(self.timeout, "unscoped_all", self.storage.fetch(&Query::new(T::ENTITY))).await
    }

    pub async fn find_where(&self, filters: Vec<Filter>) -> Result<Vec<T>, RepositoryError> {
        let query = Query::new(T::ENTITY).filters(filters);
        bounded(self.timeout, "unscoped_find_where", self.storage.fetch(&query)).await
    }

    pub async fn count(&self) -> Result<u64, RepositoryError> {
        bounded(self.timeout, "unscoped_count", self.storage.count(&Query::new(T::ENTITY))).await
    }
}
