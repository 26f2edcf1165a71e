//! Postgres-backed `Storage<T>`.
//!
//! Each record type maps to one table named after `Entity::ENTITY` with:
//!
//! | column | source |
//! |--------|--------|
//! | `id` | `Entity::id` |
//! | `tenant_id` | `TenantOwned::tenant_id` |
//! | one column per `Record::columns` entry | queryable projection |
//! | `document JSONB` | the full serde representation |
//!
//! Reads deserialize `document`; the projected columns only exist so filters,
//! ordering and unique constraints run inside the database.
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | `StorageError` |
//! |------------|----------|----------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` (constraint name) |
//! | Database (other) | any | `Backend` |
//! | PoolTimedOut | n/a | `Timeout` |
//! | PoolClosed / Io | n/a | `Unavailable` |
//! | Other | n/a | `Backend` |

use std::marker::PhantomData;
use std::sync::Arc;

use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{Span, instrument};

use crate::tenancy::{Direction, FilterOp, Query, Record, Storage, StorageError, Value};

pub struct PgStorage<T> {
    pool: Arc<PgPool>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for PgStorage<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> core::fmt::Debug for PgStorage<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PgStorage").finish_non_exhaustive()
    }
}

impl<T> PgStorage<T> {
    pub fn new(pool: PgPool) -> Self {
        Self::shared(Arc::new(pool))
    }

    /// Share one pool between the storages of several record types.
    pub fn shared(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            _record: PhantomData,
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        // Untyped NULL lets Postgres infer the column type.
        Value::Null => {
            builder.push("NULL");
        }
        Value::Uuid(v) => {
            builder.push_bind(*v);
        }
        Value::Text(v) => {
            builder.push_bind(v.clone());
        }
        Value::Int(v) => {
            builder.push_bind(*v);
        }
        Value::Bool(v) => {
            builder.push_bind(*v);
        }
        Value::Decimal(v) => {
            builder.push_bind(*v);
        }
        Value::Date(v) => {
            builder.push_bind(*v);
        }
        Value::Timestamp(v) => {
            builder.push_bind(*v);
        }
    }
}

fn push_where(builder: &mut QueryBuilder<'_, Postgres>, query: &Query) {
    for (i, filter) in query.filters.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        builder.push(filter.column);
        match filter.op {
            FilterOp::IsNull => {
                builder.push(" IS NULL");
            }
            FilterOp::Eq if filter.value.is_null() => {
                builder.push(" IS NULL");
            }
            op => {
                builder.push(" ");
                builder.push(op.as_sql());
                builder.push(" ");
                push_value(builder, &filter.value);
            }
        }
    }
}

fn push_order_and_page(builder: &mut QueryBuilder<'_, Postgres>, query: &Query) {
    for (i, (column, direction)) in query.order.iter().enumerate() {
        builder.push(if i == 0 { " ORDER BY " } else { ", " });
        builder.push(*column);
        builder.push(match direction {
            Direction::Asc => " ASC",
            Direction::Desc => " DESC",
        });
    }
    if let Some(page) = query.pagination {
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(page.limit));
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(page.offset));
    }
}

pub(crate) fn select_sql<'a>(table: &str, query: &Query) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT document FROM {table}"));
    push_where(&mut builder, query);
    push_order_and_page(&mut builder, query);
    builder
}

pub(crate) fn count_sql<'a>(table: &str, query: &Query) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {table}"));
    push_where(&mut builder, query);
    builder
}

pub(crate) fn delete_sql<'a>(table: &str, query: &Query) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!("DELETE FROM {table}"));
    push_where(&mut builder, query);
    builder
}

fn document<T: Record>(record: &T) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(record).map_err(|e| StorageError::Backend(format!("failed to serialize {}: {e}", T::ENTITY)))
}

pub(crate) fn insert_sql<'a, T: Record>(record: &T) -> Result<QueryBuilder<'a, Postgres>, StorageError> {
    let columns = record.columns();

    let mut builder = QueryBuilder::new(format!("INSERT INTO {} (id, tenant_id", T::ENTITY));
    for (name, _) in &columns {
        builder.push(", ");
        builder.push(*name);
    }
    builder.push(", document) VALUES (");
    push_value(&mut builder, &record.column("id"));
    builder.push(", ");
    push_value(&mut builder, &record.column("tenant_id"));
    for (_, value) in &columns {
        builder.push(", ");
        push_value(&mut builder, value);
    }
    builder.push(", ");
    builder.push_bind(Json(document(record)?));
    builder.push(")");
    Ok(builder)
}

pub(crate) fn update_sql<'a, T: Record>(query: &Query, record: &T) -> Result<QueryBuilder<'a, Postgres>, StorageError> {
    let mut builder = QueryBuilder::new(format!("UPDATE {} SET tenant_id = ", T::ENTITY));
    push_value(&mut builder, &record.column("tenant_id"));
    for (name, value) in record.columns() {
        builder.push(", ");
        builder.push(name);
        builder.push(" = ");
        push_value(&mut builder, &value);
    }
    builder.push(", document = ");
    builder.push_bind(Json(document(record)?));
    push_where(&mut builder, query);
    Ok(builder)
}

#[async_trait::async_trait]
impl<T: Record> Storage<T> for PgStorage<T> {
    #[instrument(skip(self, query), fields(entity = T::ENTITY, row_count), err)]
    async fn fetch(&self, query: &Query) -> Result<Vec<T>, StorageError> {
        let mut builder = select_sql(T::ENTITY, query);
        let rows: Vec<Json<serde_json::Value>> = builder
            .build_query_scalar()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch", e))?;

        Span::current().record("row_count", rows.len());
        rows.into_iter()
            .map(|Json(doc)| {
                serde_json::from_value(doc)
                    .map_err(|e| StorageError::Backend(format!("corrupt {} document: {e}", T::ENTITY)))
            })
            .collect()
    }

    #[instrument(skip(self, query), fields(entity = T::ENTITY), err)]
    async fn count(&self, query: &Query) -> Result<u64, StorageError> {
        let mut builder = count_sql(T::ENTITY, query);
        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    #[instrument(skip(self, record), fields(entity = T::ENTITY), err)]
    async fn insert(&self, record: &T) -> Result<(), StorageError> {
        let mut builder = insert_sql(record)?;
        builder
            .build()
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;
        Ok(())
    }

    #[instrument(skip(self, query, record), fields(entity = T::ENTITY, rows_affected), err)]
    async fn update(&self, query: &Query, record: &T) -> Result<u64, StorageError> {
        let mut builder = update_sql(query, record)?;
        let result = builder
            .build()
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update", e))?;

        Span::current().record("rows_affected", result.rows_affected());
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, query), fields(entity = T::ENTITY), err)]
    async fn delete(&self, query: &Query) -> Result<u64, StorageError> {
        let mut builder = delete_sql(T::ENTITY, query);
        let result = builder
            .build()
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(result.rows_affected())
    }
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                tracing::debug!(operation, constraint = %constraint, "unique violation");
                StorageError::UniqueViolation(constraint)
            } else {
                StorageError::Backend(format!("database error in {operation}: {}", db_err.message()))
            }
        }
        sqlx::Error::PoolTimedOut => StorageError::Timeout(format!("connection pool timed out in {operation}")),
        sqlx::Error::PoolClosed => StorageError::Unavailable(format!("connection pool closed in {operation}")),
        sqlx::Error::Io(e) => StorageError::Unavailable(format!("io error in {operation}: {e}")),
        other => StorageError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
