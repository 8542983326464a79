//! Configuration management.
//!
//! Settings come from `<data_dir>/config.toml` when present, with defaults
//! for everything else. A `.env` file is honored (loaded in main) and a few
//! environment variables override the file. The storage backend is chosen
//! here, once; the download manager itself never inspects which concrete
//! store is active.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::repository::{DownloadStore, MemoryDownloadStore, SqliteDownloadStore};
use crate::services::download::DownloadConfig;

const DEFAULT_DATABASE_FILENAME: &str = "cumulus.db";
const DOWNLOADS_SUBDIR: &str = "downloads";
const CONFIG_FILENAME: &str = "config.toml";

/// Which persistence backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite file under the data directory (default).
    Sqlite,
    /// In-memory table; records vanish on restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename under `data_dir`.
    pub database_filename: String,
    /// Directory downloaded files are stored in.
    pub downloads_dir: PathBuf,
    /// Persistence backend.
    pub storage: StorageBackend,
    /// Bind host for the web server.
    pub host: String,
    /// Bind port for the web server.
    pub port: u16,
    /// User agent for outbound HTTP requests.
    pub user_agent: String,
    /// Overall probe deadline in seconds.
    pub probe_timeout: u64,
    /// Connection-establishment timeout in seconds.
    pub connect_timeout: u64,
    /// Per-read stall timeout in seconds.
    pub read_timeout: u64,
    /// Redirect hop limit for probes and transfers.
    pub max_redirects: usize,
    /// Milliseconds between persisted progress samples.
    pub progress_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: platform data dir -> home dir -> current dir
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cumulus");

        Self {
            downloads_dir: data_dir.join(DOWNLOADS_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            storage: StorageBackend::Sqlite,
            host: "127.0.0.1".to_string(),
            port: 8080,
            user_agent: format!("Cumulus/{}", env!("CARGO_PKG_VERSION")),
            probe_timeout: 15,
            connect_timeout: 20,
            read_timeout: 60,
            max_redirects: 10,
            progress_interval_ms: 1000,
        }
    }
}

impl Settings {
    /// Load settings, with `data_dir` overriding both the config location
    /// and the directory layout.
    pub fn load(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let base_dir = match &data_dir {
            Some(dir) => dir.clone(),
            None => Settings::default().data_dir,
        };

        let mut settings = match fs::read_to_string(base_dir.join(CONFIG_FILENAME)) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => return Err(e.into()),
        };

        // An explicit --data-dir wins over whatever the file says.
        if let Some(dir) = data_dir {
            settings.downloads_dir = dir.join(DOWNLOADS_SUBDIR);
            settings.data_dir = dir;
        }

        if let Ok(port) = std::env::var("CUMULUS_PORT") {
            settings.port = port.parse()?;
        }
        if let Ok(dir) = std::env::var("CUMULUS_DOWNLOADS_DIR") {
            settings.downloads_dir = PathBuf::from(dir);
        }

        Ok(settings)
    }

    /// Create settings rooted at a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            downloads_dir: data_dir.join(DOWNLOADS_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    /// Path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Create the data and downloads directories.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.downloads_dir)?;
        Ok(())
    }

    /// Instantiate the configured persistence backend.
    pub fn create_store(&self) -> Arc<dyn DownloadStore> {
        match self.storage {
            StorageBackend::Sqlite => Arc::new(SqliteDownloadStore::new(&self.database_path())),
            StorageBackend::Memory => Arc::new(MemoryDownloadStore::new()),
        }
    }

    /// Download manager tunables derived from these settings.
    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            downloads_dir: self.downloads_dir.clone(),
            user_agent: self.user_agent.clone(),
            probe_timeout: Duration::from_secs(self.probe_timeout),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            read_timeout: Duration::from_secs(self.read_timeout),
            max_redirects: self.max_redirects,
            progress_interval: Duration::from_millis(self.progress_interval_ms),
        }
    }

    /// Write the current settings to `<data_dir>/config.toml`.
    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(dir)?;
        let content = toml::to_string_pretty(self)?;
        fs::write(dir.join(CONFIG_FILENAME), content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.storage, StorageBackend::Sqlite);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.database_filename, DEFAULT_DATABASE_FILENAME);
        assert!(settings.downloads_dir.ends_with(DOWNLOADS_SUBDIR));
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            "port = 9999\nstorage = \"memory\"\n",
        )
        .unwrap();

        let settings = Settings::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(settings.port, 9999);
        assert_eq!(settings.storage, StorageBackend::Memory);
        // Defaults still fill the rest; --data-dir override applies.
        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.max_redirects, 10);
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.data_dir, dir.path());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::with_data_dir(dir.path().to_path_buf());
        settings.port = 4444;
        settings.save(dir.path()).unwrap();

        let loaded = Settings::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(loaded.port, 4444);
    }
}
