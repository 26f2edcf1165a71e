use std::cmp::Ordering;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use super::query::{Direction, Query};
use super::storage::{Record, Storage, StorageError};

/// In-memory storage for tests/dev.
///
/// Enforces the primary key and the record's secondary unique key the way a
/// database constraint would. Latency and outages can be injected to exercise
/// timeout and fail-closed paths.
#[derive(Debug)]
pub struct InMemoryStorage<T> {
    rows: RwLock<Vec<T>>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl<T> InMemoryStorage<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Make every subsequent call fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, AtomicOrdering::SeqCst);
    }

    async fn gate(&self, operation: &str) -> Result<(), StorageError> {
        let ms = self.latency_ms.load(AtomicOrdering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(StorageError::Unavailable(format!("in-memory storage offline during {operation}")));
        }
        Ok(())
    }
}

impl<T: Clone> InMemoryStorage<T> {
    /// Every stored row regardless of tenant. Test inspection only.
    pub fn rows(&self) -> Vec<T> {
        self.rows.read().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl<T> Default for InMemoryStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("in-memory storage lock poisoned".to_string())
}

fn compare_rows<T: Record>(a: &T, b: &T, order: &[(&'static str, Direction)]) -> Ordering {
    for (column, direction) in order {
        let ord = a
            .column(column)
            .compare(&b.column(column))
            .unwrap_or(Ordering::Equal);
        let ord = match direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Check `candidate` against `others` for primary and secondary key clashes.
fn check_unique<'a, T: Record>(
    candidate: &T,
    mut others: impl Iterator<Item = &'a T>,
) -> Result<(), StorageError> {
    let id = candidate.column("id");
    let key = candidate.unique_key();
    others.try_for_each(|other| {
        if other.column("id") == id {
            return Err(StorageError::UniqueViolation(format!("{}_pkey", T::ENTITY)));
        }
        if let (Some((name, values)), Some((_, other_values))) = (&key, other.unique_key()) {
            if *values == other_values {
                return Err(StorageError::UniqueViolation((*name).to_string()));
            }
        }
        Ok(())
    })
}

#[async_trait::async_trait]
impl<T: Record> Storage<T> for InMemoryStorage<T> {
    async fn fetch(&self, query: &Query) -> Result<Vec<T>, StorageError> {
        self.gate("fetch").await?;
        let rows = self.rows.read().map_err(|_| poisoned())?;

        let mut matched: Vec<T> = rows
            .iter()
            .filter(|row| query.matches(|column| row.column(column)))
            .cloned()
            .collect();
        drop(rows);

        if !query.order.is_empty() {
            matched.sort_by(|a, b| compare_rows(a, b, &query.order));
        }
        if let Some(page) = query.pagination {
            matched = matched
                .into_iter()
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .collect();
        }
        Ok(matched)
    }

    async fn count(&self, query: &Query) -> Result<u64, StorageError> {
        self.gate("count").await?;
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .iter()
            .filter(|row| query.matches(|column| row.column(column)))
            .count() as u64)
    }

    async fn insert(&self, record: &T) -> Result<(), StorageError> {
        self.gate("insert").await?;
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        check_unique(record, rows.iter())?;
        rows.push(record.clone());
        Ok(())
    }

    async fn update(&self, query: &Query, record: &T) -> Result<u64, StorageError> {
        self.gate("update").await?;
        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        let targets: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| query.matches(|column| row.column(column)))
            .map(|(i, _)| i)
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        // The primary key is not rewritten, so a row sharing the record's id is never a clash.
        let id = record.column("id");
        let others = rows
            .iter()
            .enumerate()
            .filter(|(i, row)| !targets.contains(i) && row.column("id") != id)
            .map(|(_, row)| row);
        check_unique(record, others)?;

        for i in &targets {
            rows[*i] = record.clone();
        }
        Ok(targets.len() as u64)
    }

    async fn delete(&self, query: &Query) -> Result<u64, StorageError> {
        self.gate("delete").await?;
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let before = rows.len();
        rows.retain(|row| !query.matches(|column| row.column(column)));
        Ok((before - rows.len()) as u64)
    }
}
