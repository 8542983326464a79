//! Download record model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a remote download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Error,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "downloading" => Some(Self::Downloading),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether a transfer may still run (or be started) for this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote download tracked by the server.
///
/// Records are mutated only through orchestrator-mediated transitions;
/// `downloaded_size` never decreases while a transfer is attached, and
/// `local_path` is fixed once metadata is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    /// Stable identifier, assigned at creation, never reused.
    pub id: Uuid,
    /// URL as given by the client.
    pub requested_url: String,
    /// Post-redirect target (equals `requested_url` until probed).
    pub resolved_url: String,
    /// Display name of the file being fetched.
    pub filename: String,
    /// On-disk destination.
    pub local_path: PathBuf,
    /// Declared size in bytes; 0 when unknown.
    pub total_size: u64,
    /// Bytes written to `local_path` so far.
    pub downloaded_size: u64,
    /// Most recent instantaneous throughput sample (bytes/sec); 0 when idle.
    pub speed: f64,
    pub status: DownloadStatus,
    /// Set only while `status` is Error; cleared on resume.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DownloadRecord {
    /// Create a fresh pending record for a requested URL.
    pub fn new(id: Uuid, requested_url: &str) -> Self {
        Self {
            id,
            requested_url: requested_url.to_string(),
            resolved_url: requested_url.to_string(),
            filename: String::new(),
            local_path: PathBuf::new(),
            total_size: 0,
            downloaded_size: 0,
            speed: 0.0,
            status: DownloadStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Completion percentage, 0.0 when the total is unknown.
    pub fn progress_percent(&self) -> f64 {
        if self.total_size > 0 {
            (self.downloaded_size as f64 / self.total_size as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            DownloadStatus::Pending,
            DownloadStatus::Downloading,
            DownloadStatus::Paused,
            DownloadStatus::Completed,
            DownloadStatus::Error,
        ] {
            assert_eq!(DownloadStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(DownloadStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = DownloadRecord::new(Uuid::new_v4(), "https://example.com/file.zip");
        assert_eq!(record.status, DownloadStatus::Pending);
        assert_eq!(record.resolved_url, record.requested_url);
        assert_eq!(record.downloaded_size, 0);
        assert!(record.started_at.is_none());
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn test_progress_percent() {
        let mut record = DownloadRecord::new(Uuid::new_v4(), "https://example.com/file.zip");
        record.total_size = 200;
        record.downloaded_size = 50;
        assert!((record.progress_percent() - 25.0).abs() < f64::EPSILON);

        record.total_size = 0;
        assert_eq!(record.progress_percent(), 0.0);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = DownloadRecord::new(Uuid::new_v4(), "https://example.com/a.bin");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("requestedUrl").is_some());
        assert!(json.get("downloadedSize").is_some());
        assert_eq!(json["status"], "pending");
    }
}
