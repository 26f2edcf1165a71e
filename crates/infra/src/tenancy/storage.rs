use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use utilbill_core::TenantOwned;

use super::query::{Query, TENANT_COLUMN, Value};

/// Storage operation error.
///
/// Infrastructure failures only; "not found" is an empty result, not an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A unique key (primary or secondary) already holds a record.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("storage operation timed out: {0}")]
    Timeout(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Timeout(_) | StorageError::Unavailable(_))
    }
}

/// A persistable, tenant-owned row.
///
/// Each record exposes the columns queries may filter or order on. Backends
/// store the full record alongside them (the Postgres backend as a JSONB
/// document), so `columns` only needs what is queried.
pub trait Record: TenantOwned + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Queryable columns other than `id` and `tenant_id`.
    fn columns(&self) -> Vec<(&'static str, Value)>;

    /// Secondary unique key as `(constraint name, key values)`, if any.
    fn unique_key(&self) -> Option<(&'static str, Vec<Value>)> {
        None
    }

    fn column(&self, name: &str) -> Value {
        match name {
            "id" => Value::Uuid(self.id().into()),
            TENANT_COLUMN => self.tenant_id().into(),
            _ => self
                .columns()
                .into_iter()
                .find(|(column, _)| *column == name)
                .map(|(_, value)| value)
                .unwrap_or(Value::Null),
        }
    }
}

/// Raw storage for one record type. Knows nothing about tenants: the
/// tenant predicate arrives inside the `Query` like any other filter.
#[async_trait::async_trait]
pub trait Storage<T: Record>: Send + Sync {
    async fn fetch(&self, query: &Query) -> Result<Vec<T>, StorageError>;

    async fn count(&self, query: &Query) -> Result<u64, StorageError>;

    async fn insert(&self, record: &T) -> Result<(), StorageError>;

    /// Replace every record matching `query` with `record`; returns rows affected.
    ///
    /// Putting the expected version in `query` makes this a compare-and-set.
    async fn update(&self, query: &Query, record: &T) -> Result<u64, StorageError>;

    async fn delete(&self, query: &Query) -> Result<u64, StorageError>;
}

#[async_trait::async_trait]
impl<T, S> Storage<T> for Arc<S>
where
    T: Record,
    S: Storage<T> + ?Sized,
{
    async fn fetch(&self, query: &Query) -> Result<Vec<T>, StorageError> {
        (**self).fetch(query).await
    }

    async fn count(&self, query: &Query) -> Result<u64, StorageError> {
        (**self).count(query).await
    }

    async fn insert(&self, record: &T) -> Result<(), StorageError> {
        (**self).insert(record).await
    }

    async fn update(&self, query: &Query, record: &T) -> Result<u64, StorageError> {
        (**self).update(query, record).await
    }

    async fn delete(&self, query: &Query) -> Result<u64, StorageError> {
        (**self).delete(query).await
    }
}
