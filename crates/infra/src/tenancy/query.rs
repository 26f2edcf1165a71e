//! Storage-neutral query description.
//!
//! Repositories build a [`Query`]; storage backends interpret it (in-memory
//! matching, SQL rendering). Column names are compile-time constants.

use core::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use utilbill_core::{TenantId, UserId};

/// Name of the tenant column every scoped table carries.
pub const TENANT_COLUMN: &str = "tenant_id";

/// A typed column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Uuid(Uuid),
    Text(String),
    Int(i64),
    Bool(bool),
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Ordering between two values of the same kind; `None` across kinds or for nulls.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<TenantId> for Value {
    fn from(v: TenantId) -> Self {
        Value::Uuid(v.into())
    }
}

impl From<UserId> for Value {
    fn from(v: UserId) -> Self {
        Value::Uuid(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    IsNull,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl FilterOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::IsNull => "IS NULL",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: &'static str,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: &'static str, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            column,
            op,
            value: value.into(),
        }
    }

    /// Equality; an `eq` against `Value::Null` behaves as `IS NULL`.
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }

    pub fn is_null(column: &'static str) -> Self {
        Self::new(column, FilterOp::IsNull, Value::Null)
    }

    pub fn lt(column: &'static str, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Lt, value)
    }

    pub fn lte(column: &'static str, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Lte, value)
    }

    pub fn gt(column: &'static str, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Gt, value)
    }

    pub fn gte(column: &'static str, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Gte, value)
    }

    /// Evaluate against a record's column value.
    pub fn matches(&self, actual: &Value) -> bool {
        match self.op {
            FilterOp::IsNull => actual.is_null(),
            FilterOp::Eq if self.value.is_null() => actual.is_null(),
            FilterOp::Eq => actual == &self.value,
            FilterOp::Lt => actual.compare(&self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(actual.compare(&self.value), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Gt => actual.compare(&self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                actual.compare(&self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of records to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000),
            offset: offset.unwrap_or(0),
        }
    }

    /// 1-based page number and page size.
    pub fn page(page: u32, page_size: u32) -> Self {
        let limit = page_size.clamp(1, 1000);
        Self {
            limit,
            offset: page.saturating_sub(1).saturating_mul(limit),
        }
    }
}

/// One page of results plus the total matching count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub entity: &'static str,
    pub filters: Vec<Filter>,
    pub order: Vec<(&'static str, Direction)>,
    pub pagination: Option<Pagination>,
}

impl Query {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            filters: Vec::new(),
            order: Vec::new(),
            pagination: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn order_by(mut self, column: &'static str, direction: Direction) -> Self {
        self.order.push((column, direction));
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// The same query without ordering or pagination (for counts).
    pub fn unpaged(&self) -> Self {
        Self {
            entity: self.entity,
            filters: self.filters.clone(),
            order: Vec::new(),
            pagination: None,
        }
    }

    /// Tenant this query is restricted to, if it carries a tenant predicate.
    pub fn tenant(&self) -> Option<TenantId> {
        self.filters.iter().find_map(|f| match (f.op, &f.value) {
            (FilterOp::Eq, Value::Uuid(id)) if f.column == TENANT_COLUMN => Some(TenantId::from_uuid(*id)),
            _ => None,
        })
    }

    /// Evaluate all filters against a column lookup.
    pub fn matches(&self, column: impl Fn(&str) -> Value) -> bool {
        self.filters.iter().all(|f| f.matches(&column(f.column)))
    }
}
