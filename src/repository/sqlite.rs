//! SQLite-backed download store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_datetime, parse_datetime_opt, DownloadStore, RepositoryError, Result};
use crate::models::{DownloadRecord, DownloadStatus};

/// SQLite-backed store, one connection per call.
///
/// Statements here are short and the database is local, so connections are
/// opened per operation with a busy timeout instead of pooling.
pub struct SqliteDownloadStore {
    db_path: PathBuf,
}

impl SqliteDownloadStore {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                id TEXT PRIMARY KEY,
                requested_url TEXT NOT NULL,
                resolved_url TEXT NOT NULL,
                filename TEXT NOT NULL,
                local_path TEXT NOT NULL,
                total_size INTEGER NOT NULL DEFAULT 0,
                downloaded_size INTEGER NOT NULL DEFAULT 0,
                speed REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );
        "#,
        )?;
        Ok(())
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<DownloadRecord> {
    Ok(DownloadRecord {
        id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap_or(Uuid::nil()),
        requested_url: row.get("requested_url")?,
        resolved_url: row.get("resolved_url")?,
        filename: row.get("filename")?,
        local_path: PathBuf::from(row.get::<_, String>("local_path")?),
        total_size: row.get::<_, i64>("total_size")? as u64,
        downloaded_size: row.get::<_, i64>("downloaded_size")? as u64,
        speed: row.get("speed")?,
        status: DownloadStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(DownloadStatus::Error),
        error_message: row.get("error_message")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        started_at: parse_datetime_opt(row.get::<_, Option<String>>("started_at")?),
        completed_at: parse_datetime_opt(row.get::<_, Option<String>>("completed_at")?),
    })
}

/// Column values for SET clauses, in the fixed `SET_COLUMNS` order.
fn record_values(record: &DownloadRecord) -> Vec<Value> {
    vec![
        Value::Text(record.requested_url.clone()),
        Value::Text(record.resolved_url.clone()),
        Value::Text(record.filename.clone()),
        Value::Text(record.local_path.to_string_lossy().into_owned()),
        Value::Integer(record.total_size as i64),
        Value::Integer(record.downloaded_size as i64),
        Value::Real(record.speed),
        Value::Text(record.status.as_str().to_string()),
        match &record.error_message {
            Some(msg) => Value::Text(msg.clone()),
            None => Value::Null,
        },
        Value::Text(record.created_at.to_rfc3339()),
        match &record.started_at {
            Some(ts) => Value::Text(ts.to_rfc3339()),
            None => Value::Null,
        },
        match &record.completed_at {
            Some(ts) => Value::Text(ts.to_rfc3339()),
            None => Value::Null,
        },
    ]
}

const SET_COLUMNS: &str = "requested_url = ?, resolved_url = ?, filename = ?, local_path = ?, \
     total_size = ?, downloaded_size = ?, speed = ?, status = ?, error_message = ?, \
     created_at = ?, started_at = ?, completed_at = ?";

#[async_trait]
impl DownloadStore for SqliteDownloadStore {
    async fn init(&self) -> Result<()> {
        self.init_schema()
    }

    async fn insert(&self, record: &DownloadRecord) -> Result<()> {
        let conn = self.connect()?;
        let mut values = vec![Value::Text(record.id.to_string())];
        values.extend(record_values(record));
        conn.execute(
            r#"
            INSERT INTO downloads (
                id, requested_url, resolved_url, filename, local_path,
                total_size, downloaded_size, speed, status, error_message,
                created_at, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params_from_iter(values),
        )?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DownloadRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM downloads WHERE id = ?")?;
        let record = stmt
            .query_row(params![id.to_string()], row_to_record)
            .optional()?;
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<DownloadRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM downloads ORDER BY created_at DESC")?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn update(&self, record: &DownloadRecord) -> Result<()> {
        let conn = self.connect()?;
        let mut values = record_values(record);
        values.push(Value::Text(record.id.to_string()));
        conn.execute(
            &format!("UPDATE downloads SET {SET_COLUMNS} WHERE id = ?"),
            rusqlite::params_from_iter(values),
        )?;
        Ok(())
    }

    async fn update_if_status(
        &self,
        record: &DownloadRecord,
        expected: &[DownloadStatus],
    ) -> Result<bool> {
        if expected.is_empty() {
            return Err(RepositoryError::Corrupt(
                "conditional update without expected statuses".to_string(),
            ));
        }
        let conn = self.connect()?;
        let placeholders = expected.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let mut values = record_values(record);
        values.push(Value::Text(record.id.to_string()));
        values.extend(
            expected
                .iter()
                .map(|s| Value::Text(s.as_str().to_string())),
        );
        let changed = conn.execute(
            &format!("UPDATE downloads SET {SET_COLUMNS} WHERE id = ? AND status IN ({placeholders})"),
            rusqlite::params_from_iter(values),
        )?;
        Ok(changed > 0)
    }

    async fn update_progress(
        &self,
        id: Uuid,
        downloaded: u64,
        speed: f64,
        total: u64,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE downloads SET downloaded_size = ?, speed = ?, total_size = ? WHERE id = ?",
            params![downloaded as i64, speed, total as i64, id.to_string()],
        )?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "DELETE FROM downloads WHERE id = ?",
            params![id.to_string()],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn test_store() -> (SqliteDownloadStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteDownloadStore::new(&dir.path().join("test.db"));
        store.init().await.unwrap();
        (store, dir)
    }

    fn sample_record() -> DownloadRecord {
        let mut record = DownloadRecord::new(Uuid::new_v4(), "https://example.com/file.zip");
        record.filename = "file.zip".to_string();
        record.local_path = PathBuf::from("/tmp/file.zip");
        record.total_size = 1024;
        record
    }

    #[tokio::test]
    async fn test_insert_get_round_trip() {
        let (store, _dir) = test_store().await;
        let record = sample_record();
        store.insert(&record).await.unwrap();

        let loaded = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.requested_url, record.requested_url);
        assert_eq!(loaded.filename, "file.zip");
        assert_eq!(loaded.total_size, 1024);
        assert_eq!(loaded.status, DownloadStatus::Pending);
        assert!(loaded.error_message.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (store, _dir) = test_store().await;
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_progress() {
        let (store, _dir) = test_store().await;
        let mut record = sample_record();
        store.insert(&record).await.unwrap();

        record.status = DownloadStatus::Downloading;
        record.started_at = Some(Utc::now());
        store.update(&record).await.unwrap();

        store
            .update_progress(record.id, 512, 128.0, 1024)
            .await
            .unwrap();

        let loaded = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, DownloadStatus::Downloading);
        assert_eq!(loaded.downloaded_size, 512);
        assert_eq!(loaded.total_size, 1024);
        assert!((loaded.speed - 128.0).abs() < f64::EPSILON);
        assert!(loaded.started_at.is_some());
    }

    #[tokio::test]
    async fn test_update_if_status_guards_transitions() {
        let (store, _dir) = test_store().await;
        let mut record = sample_record();
        store.insert(&record).await.unwrap();

        record.status = DownloadStatus::Downloading;
        assert!(store
            .update_if_status(&record, &[DownloadStatus::Pending])
            .await
            .unwrap());

        // A second transition expecting Pending must fail now.
        record.status = DownloadStatus::Paused;
        assert!(!store
            .update_if_status(&record, &[DownloadStatus::Pending])
            .await
            .unwrap());

        let loaded = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, DownloadStatus::Downloading);
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _dir) = test_store().await;
        let record = sample_record();
        store.insert(&record).await.unwrap();

        assert!(store.delete(record.id).await.unwrap());
        assert!(!store.delete(record.id).await.unwrap());
        assert!(store.get(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let (store, _dir) = test_store().await;
        let mut first = sample_record();
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        let second = sample_record();
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, second.id);
        assert_eq!(records[1].id, first.id);
    }
}
