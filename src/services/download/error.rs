//! Download error taxonomy.

use std::time::Duration;

use crate::client::ClientError;
use crate::models::DownloadStatus;
use crate::repository::RepositoryError;

/// Errors surfaced by the download manager.
///
/// Resolution failures (redirect limit, unreachable resource) are terminal
/// for the probe step only; transfer failures are terminal for the current
/// attempt and leave the record resumable.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid download url: {0}")]
    InvalidUrl(String),
    #[error("probe timed out after {0:?}")]
    ProbeTimeout(Duration),
    #[error("resource unreachable (HTTP {status})")]
    Unreachable { status: u16 },
    #[error("transfer size mismatch (expected {expected} bytes, got {actual})")]
    LengthMismatch { expected: u64, actual: u64 },
    #[error("download not found")]
    NotFound,
    #[error("{action} not allowed while {status}")]
    InvalidState {
        action: &'static str,
        status: DownloadStatus,
    },
    #[error("a transfer is already attached to this download")]
    AlreadyActive,
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
