//! In-memory download store.
//!
//! Used by the test suite and the one-shot `fetch` command, where durability
//! across restarts buys nothing. Selected with `storage = "memory"`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DownloadStore, Result};
use crate::models::{DownloadRecord, DownloadStatus};

#[derive(Default)]
pub struct MemoryDownloadStore {
    records: RwLock<HashMap<Uuid, DownloadRecord>>,
}

impl MemoryDownloadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DownloadStore for MemoryDownloadStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, record: &DownloadRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<DownloadRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<DownloadRecord>> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn update(&self, record: &DownloadRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            records.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn update_if_status(
        &self,
        record: &DownloadRecord,
        expected: &[DownloadStatus],
    ) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get(&record.id) {
            Some(current) if expected.contains(&current.status) => {
                records.insert(record.id, record.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_progress(
        &self,
        id: Uuid,
        downloaded: u64,
        speed: f64,
        total: u64,
    ) -> Result<()> {
        if let Some(record) = self.records.write().await.get_mut(&id) {
            record.downloaded_size = downloaded;
            record.speed = speed;
            record.total_size = total;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crud_round_trip() {
        let store = MemoryDownloadStore::new();
        let mut record = DownloadRecord::new(Uuid::new_v4(), "https://example.com/a.bin");
        store.insert(&record).await.unwrap();

        record.status = DownloadStatus::Downloading;
        store.update(&record).await.unwrap();
        assert_eq!(
            store.get(record.id).await.unwrap().unwrap().status,
            DownloadStatus::Downloading
        );

        store.update_progress(record.id, 10, 5.0, 100).await.unwrap();
        let loaded = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.downloaded_size, 10);
        assert_eq!(loaded.total_size, 100);

        assert!(store.delete(record.id).await.unwrap());
        assert!(store.get(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_if_status_rejects_mismatch() {
        let store = MemoryDownloadStore::new();
        let mut record = DownloadRecord::new(Uuid::new_v4(), "https://example.com/a.bin");
        store.insert(&record).await.unwrap();

        record.status = DownloadStatus::Paused;
        assert!(!store
            .update_if_status(&record, &[DownloadStatus::Downloading])
            .await
            .unwrap());
        assert!(store
            .update_if_status(&record, &[DownloadStatus::Pending])
            .await
            .unwrap());
    }
}
