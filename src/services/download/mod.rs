//! Remote download manager.
//!
//! Owns the per-download state machine, coordinates the prober and the
//! streaming worker, and persists every transition through the store before
//! touching the in-memory transfer registry. Progress and status changes
//! fan out through the event broadcaster.

mod error;
mod events;
mod probe;
mod registry;
mod worker;

pub use error::DownloadError;
pub use events::{DownloadEvent, EventBroadcaster};
pub use probe::{probe, ResourceProbe};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use crate::client::{build_client, ClientError};
use crate::models::{DownloadRecord, DownloadStatus};
use crate::repository::DownloadStore;
use crate::utils;

use registry::{SignalKind, TransferRegistry};
use worker::TransferOutcome;

/// Tunables for the download manager.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory download destinations are reserved under.
    pub downloads_dir: PathBuf,
    pub user_agent: String,
    /// Overall bound on the metadata probe.
    pub probe_timeout: Duration,
    /// Connection-establishment bound for probe and transfer alike.
    pub connect_timeout: Duration,
    /// Per-read stall bound; the transfer itself has no overall deadline.
    pub read_timeout: Duration,
    pub max_redirects: usize,
    /// Sliding window between persisted progress samples.
    pub progress_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("./downloads"),
            user_agent: format!("Cumulus/{}", env!("CARGO_PKG_VERSION")),
            probe_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(20),
            read_timeout: Duration::from_secs(60),
            max_redirects: 10,
            progress_interval: Duration::from_secs(1),
        }
    }
}

/// Per-status record counts.
#[derive(Debug, Default, Serialize)]
pub struct DownloadStats {
    pub total: u64,
    pub pending: u64,
    pub downloading: u64,
    pub paused: u64,
    pub completed: u64,
    pub error: u64,
}

/// The download orchestrator.
pub struct DownloadService {
    pub(crate) store: Arc<dyn DownloadStore>,
    pub(crate) events: EventBroadcaster,
    pub(crate) client: Client,
    pub(crate) config: DownloadConfig,
    registry: TransferRegistry,
}

impl DownloadService {
    pub fn new(
        store: Arc<dyn DownloadStore>,
        config: DownloadConfig,
    ) -> Result<Arc<Self>, DownloadError> {
        let client = build_client(
            &config.user_agent,
            config.connect_timeout,
            config.read_timeout,
        )
        .map_err(ClientError::from)?;

        Ok(Arc::new(Self {
            store,
            events: EventBroadcaster::new(),
            client,
            config,
            registry: TransferRegistry::new(),
        }))
    }

    /// Event channel observers subscribe to.
    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Create a download for `raw_url` and start transferring.
    ///
    /// Malformed URLs are rejected synchronously without creating a record.
    /// A failed probe still yields a record (in Error, resumable); the
    /// failure reason is returned as a warning instead of an error.
    pub async fn create(
        self: &Arc<Self>,
        raw_url: &str,
    ) -> Result<(DownloadRecord, Option<String>), DownloadError> {
        let url = parse_download_url(raw_url)?;
        let mut record = DownloadRecord::new(Uuid::new_v4(), url.as_str());
        self.store.insert(&record).await?;

        let probed = match tokio::time::timeout(
            self.config.probe_timeout,
            probe(&self.client, url.clone(), self.config.max_redirects),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DownloadError::ProbeTimeout(self.config.probe_timeout)),
        };

        match probed {
            Ok(meta) => {
                let (filename, local_path) = self.reserve_destination(&meta.filename)?;
                record.resolved_url = meta.resolved_url.to_string();
                record.filename = filename;
                record.local_path = local_path;
                record.total_size = meta.total_size;
                record.status = DownloadStatus::Downloading;
                record.started_at = Some(Utc::now());
                if self
                    .store
                    .update_if_status(&record, &[DownloadStatus::Pending])
                    .await?
                {
                    self.start_worker(&record, 0)?;
                }
                Ok((record, None))
            }
            Err(probe_err) => {
                let reason = probe_err.to_string();
                tracing::warn!(
                    id = %record.id,
                    url = %record.requested_url,
                    error = %reason,
                    "probe failed; keeping record for a later resume"
                );
                let (filename, local_path) =
                    self.reserve_destination(&probe::fallback_filename(&url))?;
                record.filename = filename;
                record.local_path = local_path;
                record.status = DownloadStatus::Error;
                record.error_message = Some(reason.clone());
                if self
                    .store
                    .update_if_status(&record, &[DownloadStatus::Pending])
                    .await?
                {
                    self.events.emit(DownloadEvent::Error {
                        id: record.id,
                        message: reason.clone(),
                    });
                }
                Ok((record, Some(reason)))
            }
        }
    }

    /// Pause a running download, retaining the bytes written so far.
    pub async fn pause(&self, id: Uuid) -> Result<(), DownloadError> {
        let mut record = self.store.get(id).await?.ok_or(DownloadError::NotFound)?;
        if record.status != DownloadStatus::Downloading {
            return Err(DownloadError::InvalidState {
                action: "pause",
                status: record.status,
            });
        }

        record.status = DownloadStatus::Paused;
        record.speed = 0.0;
        if !self
            .store
            .update_if_status(&record, &[DownloadStatus::Downloading])
            .await?
        {
            // The worker finished first; report the status it left behind.
            return match self.store.get(id).await? {
                Some(current) => Err(DownloadError::InvalidState {
                    action: "pause",
                    status: current.status,
                }),
                None => Err(DownloadError::NotFound),
            };
        }

        self.registry.signal(id, SignalKind::Pause);
        Ok(())
    }

    /// Resume a paused or failed download from its current byte offset.
    pub async fn resume(self: &Arc<Self>, id: Uuid) -> Result<(), DownloadError> {
        let previous = self.store.get(id).await?.ok_or(DownloadError::NotFound)?;
        if !matches!(
            previous.status,
            DownloadStatus::Paused | DownloadStatus::Error
        ) {
            return Err(DownloadError::InvalidState {
                action: "resume",
                status: previous.status,
            });
        }

        let mut record = previous.clone();
        record.status = DownloadStatus::Downloading;
        record.error_message = None;
        record.speed = 0.0;
        if record.started_at.is_none() {
            record.started_at = Some(Utc::now());
        }

        if !self
            .store
            .update_if_status(&record, &[previous.status])
            .await?
        {
            return match self.store.get(id).await? {
                Some(current) => Err(DownloadError::InvalidState {
                    action: "resume",
                    status: current.status,
                }),
                None => Err(DownloadError::NotFound),
            };
        }

        if let Err(err) = self.start_worker(&record, record.downloaded_size) {
            // The previous worker has not surrendered its handle yet; undo
            // the durable transition before reporting the conflict.
            let _ = self
                .store
                .update_if_status(&previous, &[DownloadStatus::Downloading])
                .await;
            return Err(err);
        }
        Ok(())
    }

    /// Cancel and delete a download, removing its record and local file.
    pub async fn delete(&self, id: Uuid) -> Result<DownloadRecord, DownloadError> {
        let record = self.store.get(id).await?.ok_or(DownloadError::NotFound)?;
        if !self.store.delete(id).await? {
            return Err(DownloadError::NotFound);
        }

        self.registry.signal(id, SignalKind::Cancel);
        self.registry.detach(id);

        if !record.local_path.as_os_str().is_empty() {
            match tokio::fs::remove_file(&record.local_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "failed to remove local file")
                }
            }
        }

        self.events.emit(DownloadEvent::Cancelled { id });
        Ok(record)
    }

    /// Snapshot of one record.
    pub async fn get(&self, id: Uuid) -> Result<Option<DownloadRecord>, DownloadError> {
        Ok(self.store.get(id).await?)
    }

    /// Snapshots of all records, newest first.
    pub async fn list(&self) -> Result<Vec<DownloadRecord>, DownloadError> {
        Ok(self.store.list().await?)
    }

    /// Per-status counts across all records.
    pub async fn stats(&self) -> Result<DownloadStats, DownloadError> {
        let mut stats = DownloadStats::default();
        for record in self.store.list().await? {
            stats.total += 1;
            match record.status {
                DownloadStatus::Pending => stats.pending += 1,
                DownloadStatus::Downloading => stats.downloading += 1,
                DownloadStatus::Paused => stats.paused += 1,
                DownloadStatus::Completed => stats.completed += 1,
                DownloadStatus::Error => stats.error += 1,
            }
        }
        Ok(stats)
    }

    /// Reserve a collision-free destination under the downloads directory.
    fn reserve_destination(&self, name: &str) -> Result<(String, PathBuf), DownloadError> {
        std::fs::create_dir_all(&self.config.downloads_dir)?;
        let (filename, path) = utils::unique_destination(&self.config.downloads_dir, name)?;
        Ok((filename, path))
    }

    /// Attach a worker for `record` and spawn its transfer task.
    fn start_worker(
        self: &Arc<Self>,
        record: &DownloadRecord,
        offset: u64,
    ) -> Result<(), DownloadError> {
        let signals = self
            .registry
            .attach(record.id)
            .ok_or(DownloadError::AlreadyActive)?;

        let service = Arc::clone(self);
        let record = record.clone();
        tokio::spawn(async move {
            let outcome = worker::run_transfer(&service, &record, offset, signals).await;
            service.finish_transfer(&record, outcome).await;
        });
        Ok(())
    }

    /// Apply a finished worker's outcome: terminal persistence first, then
    /// the registry entry is surrendered, then the matching event goes out.
    async fn finish_transfer(&self, record: &DownloadRecord, outcome: TransferOutcome) {
        let id = record.id;
        match outcome {
            TransferOutcome::Completed { bytes, total } => {
                match self.store.get(id).await {
                    Ok(Some(mut current)) => {
                        current.status = DownloadStatus::Completed;
                        current.downloaded_size = bytes;
                        current.total_size = if total > 0 { total } else { bytes };
                        current.speed = 0.0;
                        current.error_message = None;
                        if current.completed_at.is_none() {
                            current.completed_at = Some(Utc::now());
                        }
                        match self.store.update(&current).await {
                            Ok(()) => {
                                self.registry.detach(id);
                                self.events.emit(DownloadEvent::Completed { id });
                            }
                            Err(e) => {
                                self.registry.detach(id);
                                tracing::error!(id = %id, error = %e, "failed to persist completion");
                            }
                        }
                    }
                    Ok(None) => {
                        // Deleted mid-flight; nothing left to persist.
                        self.registry.detach(id);
                    }
                    Err(e) => {
                        self.registry.detach(id);
                        tracing::error!(id = %id, error = %e, "failed to load record after transfer");
                    }
                }
            }
            TransferOutcome::Paused { bytes } => {
                self.registry.detach(id);
                tracing::info!(id = %id, bytes, "transfer paused");
                self.events.emit(DownloadEvent::Paused { id });
            }
            TransferOutcome::Cancelled => {
                self.registry.detach(id);
                tracing::info!(id = %id, "transfer cancelled");
            }
            TransferOutcome::Failed { bytes, message } => {
                match self.store.get(id).await {
                    Ok(Some(mut current)) => {
                        current.status = DownloadStatus::Error;
                        current.error_message = Some(message.clone());
                        current.downloaded_size = bytes;
                        current.speed = 0.0;
                        if let Err(e) = self.store.update(&current).await {
                            tracing::error!(id = %id, error = %e, "failed to persist transfer error");
                        }
                        self.registry.detach(id);
                        tracing::warn!(id = %id, error = %message, "transfer failed");
                        self.events.emit(DownloadEvent::Error { id, message });
                    }
                    _ => {
                        self.registry.detach(id);
                    }
                }
            }
        }
    }
}

/// Validate a requested URL; only absolute http(s) URLs are accepted.
fn parse_download_url(raw: &str) -> Result<Url, DownloadError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", raw.trim(), e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DownloadError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(DownloadError::InvalidUrl("missing host".to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryDownloadStore;

    fn test_service(dir: &std::path::Path) -> Arc<DownloadService> {
        let config = DownloadConfig {
            downloads_dir: dir.to_path_buf(),
            ..DownloadConfig::default()
        };
        DownloadService::new(Arc::new(MemoryDownloadStore::new()), config).unwrap()
    }

    #[test]
    fn test_parse_download_url() {
        assert!(parse_download_url("https://example.com/a.zip").is_ok());
        assert!(parse_download_url("http://example.com").is_ok());
        assert!(matches!(
            parse_download_url("not a url"),
            Err(DownloadError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_download_url("ftp://example.com/a.zip"),
            Err(DownloadError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_download_url("file:///etc/passwd"),
            Err(DownloadError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_url_without_record() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        let result = service.create("::::").await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl(_))));
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pause_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        assert!(matches!(
            service.pause(Uuid::new_v4()).await,
            Err(DownloadError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_pause_rejected_outside_downloading() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        for status in [
            DownloadStatus::Paused,
            DownloadStatus::Completed,
            DownloadStatus::Error,
        ] {
            let mut record = DownloadRecord::new(Uuid::new_v4(), "https://example.com/f.bin");
            record.status = status;
            service.store.insert(&record).await.unwrap();

            match service.pause(record.id).await {
                Err(DownloadError::InvalidState { status: got, .. }) => assert_eq!(got, status),
                other => panic!("expected InvalidState, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[tokio::test]
    async fn test_resume_rejected_outside_paused_or_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        for status in [DownloadStatus::Downloading, DownloadStatus::Completed] {
            let mut record = DownloadRecord::new(Uuid::new_v4(), "https://example.com/f.bin");
            record.status = status;
            service.store.insert(&record).await.unwrap();
            assert!(matches!(
                service.resume(record.id).await,
                Err(DownloadError::InvalidState { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        let mut record = DownloadRecord::new(Uuid::new_v4(), "https://example.com/f.bin");
        record.status = DownloadStatus::Completed;
        record.local_path = dir.path().join("f.bin");
        std::fs::write(&record.local_path, b"data").unwrap();
        service.store.insert(&record).await.unwrap();

        let mut rx = service.events().subscribe();
        service.delete(record.id).await.unwrap();

        assert!(service.get(record.id).await.unwrap().is_none());
        assert!(!record.local_path.exists());
        assert!(matches!(
            rx.recv().await.unwrap(),
            DownloadEvent::Cancelled { .. }
        ));
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        for status in [
            DownloadStatus::Completed,
            DownloadStatus::Completed,
            DownloadStatus::Paused,
        ] {
            let mut record = DownloadRecord::new(Uuid::new_v4(), "https://example.com/f.bin");
            record.status = status;
            service.store.insert(&record).await.unwrap();
        }

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.paused, 1);
        assert_eq!(stats.downloading, 0);
    }
}
