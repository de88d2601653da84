//! Result storage for composite evaluations
//!
//! The orchestrator never keeps results itself. Each settled request is
//! handed to a [`ResultStore`], which owns the per-user expression ids.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A settled composite evaluation, ready for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistableRecord {
    pub user_id: i64,
    pub expression_id: i64,
    pub expression_text: String,
    pub result: f64,
    pub status_code: u16,
    pub created_at: DateTime<Utc>,
}

/// A settled composite evaluation before the store has assigned its id
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub user_id: i64,
    pub expression_text: String,
    pub result: f64,
    pub status_code: u16,
    pub created_at: DateTime<Utc>,
}

impl NewRecord {
    pub fn with_id(self, expression_id: i64) -> PersistableRecord {
        PersistableRecord {
            user_id: self.user_id,
            expression_id,
            expression_text: self.expression_text,
            result: self.result,
            status_code: self.status_code,
            created_at: self.created_at,
        }
    }
}

/// Persistence collaborator trait
///
/// Implementations can use SQLite, in-memory storage, or other backends.
pub trait ResultStore: Send + Sync {
    /// Next free expression id for a user (`max + 1`, starting at 1)
    fn next_expression_id(&self, user_id: i64) -> impl Future<Output = StoreResult<i64>> + Send;

    /// Assign the user's next expression id and store the record, atomically
    ///
    /// Concurrent inserts for the same user receive distinct ids.
    fn insert(
        &self,
        record: NewRecord,
    ) -> impl Future<Output = StoreResult<PersistableRecord>> + Send;

    /// Store a record under its own id; `(user_id, expression_id)` must be unused
    fn store(&self, record: &PersistableRecord) -> impl Future<Output = StoreResult<()>> + Send;

    /// Fetch a record by user and expression id
    fn get(
        &self,
        user_id: i64,
        expression_id: i64,
    ) -> impl Future<Output = StoreResult<Option<PersistableRecord>>> + Send;

    /// All records of a user, ordered by expression id
    fn list_for_user(
        &self,
        user_id: i64,
    ) -> impl Future<Output = StoreResult<Vec<PersistableRecord>>> + Send;
}

/// In-memory result store for testing and simple use cases
#[derive(Default)]
pub struct MemoryResultStore {
    records: DashMap<(i64, i64), PersistableRecord>,
    // Highest expression id per user; its entry lock serializes id assignment
    last_ids: DashMap<i64, i64>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ResultStore for MemoryResultStore {
    async fn next_expression_id(&self, user_id: i64) -> StoreResult<i64> {
        Ok(self.last_ids.get(&user_id).map_or(0, |last| *last) + 1)
    }

    async fn insert(&self, record: NewRecord) -> StoreResult<PersistableRecord> {
        let mut last = self.last_ids.entry(record.user_id).or_insert(0);
        *last += 1;
        let stored = record.with_id(*last);
        self.records
            .insert((stored.user_id, stored.expression_id), stored.clone());
        Ok(stored)
    }

    async fn store(&self, record: &PersistableRecord) -> StoreResult<()> {
        // Same lock order as `insert`: user counter first, then the record
        let mut last = self.last_ids.entry(record.user_id).or_insert(0);
        let key = (record.user_id, record.expression_id);
        match self.records.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Duplicate {
                user_id: record.user_id,
                expression_id: record.expression_id,
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record.clone());
                *last = (*last).max(record.expression_id);
                Ok(())
            },
        }
    }

    async fn get(&self, user_id: i64, expression_id: i64) -> StoreResult<Option<PersistableRecord>> {
        Ok(self
            .records
            .get(&(user_id, expression_id))
            .map(|entry| entry.value().clone()))
    }

    async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<PersistableRecord>> {
        let mut records: Vec<PersistableRecord> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.expression_id);
        Ok(records)
    }
}
