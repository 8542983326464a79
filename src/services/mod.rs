//! Long-running services behind the request surface.

pub mod download;

pub use download::{
    DownloadConfig, DownloadError, DownloadEvent, DownloadService, DownloadStats,
    EventBroadcaster, ResourceProbe,
};
