use async_trait::async_trait;
use quiz_core::model::HistoryEntry;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A history entry together with its storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub id: i64,
    pub entry: HistoryEntry,
}

impl HistoryRow {
    #[must_use]
    pub fn new(id: i64, entry: HistoryEntry) -> Self {
        Self { id, entry }
    }
}

/// Append-only log of completed quiz sessions.
///
/// Topics are matched ASCII case-insensitively, so "Rust" and "rust" share
/// a history.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Append a completed session and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn append_entry(&self, entry: &HistoryEntry) -> Result<i64, StorageError>;

    /// Fetch a single entry by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_entry(&self, id: i64) -> Result<HistoryEntry, StorageError>;

    /// All entries for `topic`, oldest first (ties keep insertion order).
    ///
    /// An empty result is normal for a topic that was never played.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn entries_for_topic(&self, topic: &str) -> Result<Vec<HistoryEntry>, StorageError>;

    /// The most recent entry for `topic`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn latest_for_topic(&self, topic: &str) -> Result<Option<HistoryEntry>, StorageError> {
        Ok(self.entries_for_topic(topic).await?.pop())
    }

    /// Most recent entries across all topics, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_rows(&self, limit: u32) -> Result<Vec<HistoryRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.len())
    }
}

fn row_id(index: usize) -> Result<i64, StorageError> {
    i64::try_from(index + 1).map_err(|_| StorageError::Serialization("id overflow".into()))
}

#[async_trait]
impl HistoryRepository for InMemoryRepository {
    async fn append_entry(&self, entry: &HistoryEntry) -> Result<i64, StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.push(entry.clone());
        row_id(guard.len() - 1)
    }

    async fn get_entry(&self, id: i64) -> Result<HistoryEntry, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| guard.get(index))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn entries_for_topic(&self, topic: &str) -> Result<Vec<HistoryEntry>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let topic = topic.trim();
        let mut found: Vec<HistoryEntry> = guard
            .iter()
            .filter(|entry| entry.topic().eq_ignore_ascii_case(topic))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        found.sort_by_key(HistoryEntry::completed_at);
        Ok(found)
    }

    async fn list_rows(&self, limit: u32) -> Result<Vec<HistoryRow>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut rows = guard
            .iter()
            .enumerate()
            .map(|(index, entry)| Ok(HistoryRow::new(row_id(index)?, entry.clone())))
            .collect::<Result<Vec<_>, StorageError>>()?;
        rows.sort_by(|a, b| {
            b.entry
                .completed_at()
                .cmp(&a.entry.completed_at())
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub history: Arc<dyn HistoryRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let history: Arc<dyn HistoryRepository> = Arc::new(InMemoryRepository::new());
        Self { history }
    }
}
