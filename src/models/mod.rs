//! Data models shared across the crate.

mod download;

pub use download::{DownloadRecord, DownloadStatus};
