//! Persistence port for download records.
//!
//! The rest of the crate only sees the `DownloadStore` trait; the concrete
//! backend (SQLite file or in-memory table) is chosen once from
//! configuration, never by runtime capability probing.

mod memory;
mod sqlite;

pub use memory::MemoryDownloadStore;
pub use sqlite::SqliteDownloadStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{DownloadRecord, DownloadStatus};

/// Errors surfaced by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid stored value: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Durable store for download records.
///
/// One row per record, keyed by id. Status transitions are persisted here
/// before the in-memory transfer registry is touched, so a crash between
/// the two leaves the record reflecting the last durable decision.
#[async_trait]
pub trait DownloadStore: Send + Sync {
    /// Create the backing schema if needed.
    async fn init(&self) -> Result<()>;

    /// Insert a freshly created record.
    async fn insert(&self, record: &DownloadRecord) -> Result<()>;

    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<Option<DownloadRecord>>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<DownloadRecord>>;

    /// Persist every field of the record unconditionally.
    async fn update(&self, record: &DownloadRecord) -> Result<()>;

    /// Persist the record only while its stored status is one of `expected`.
    ///
    /// Returns false when the stored status no longer matches (the record
    /// finished, failed or was deleted concurrently); the caller must then
    /// re-read instead of clobbering the newer transition.
    async fn update_if_status(
        &self,
        record: &DownloadRecord,
        expected: &[DownloadStatus],
    ) -> Result<bool>;

    /// Hot-path progress update; leaves status and timestamps untouched.
    async fn update_progress(&self, id: Uuid, downloaded: u64, speed: f64, total: u64)
        -> Result<()>;

    /// Remove a record. Returns false when the id was not present.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Parse a datetime column, defaulting to the Unix epoch on error.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime column.
pub(crate) fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
