//! CLI commands implementation.

mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use tokio::sync::broadcast;

use crate::config::Settings;
use crate::repository::{DownloadStore, MemoryDownloadStore};
use crate::services::download::{DownloadConfig, DownloadEvent, DownloadService};

use progress::FetchProgress;

#[derive(Parser)]
#[command(name = "cumulus")]
#[command(about = "Personal cloud server with a resumable remote download manager")]
#[command(version)]
pub struct Cli {
    /// Data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Run the web server
    Serve {
        /// Bind address: "PORT", "HOST" or "HOST:PORT"
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Download a single URL to a directory and exit
    Fetch {
        /// URL to download
        url: String,
        /// Destination directory (defaults to the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.data_dir.clone())?;

    match cli.command {
        Commands::Init => cmd_init(&settings).await,
        Commands::Serve { bind } => cmd_serve(&settings, bind.as_deref()).await,
        Commands::Fetch { url, output } => cmd_fetch(&settings, &url, output).await,
    }
}

/// Initialize the data directory and database schema.
async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let store = settings.create_store();
    store.init().await?;

    println!(
        "{} Initialized data directory at {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!(
        "  {} downloads stored under {}",
        style("→").dim(),
        settings.downloads_dir.display()
    );
    Ok(())
}

/// Start the web server.
async fn cmd_serve(settings: &Settings, bind: Option<&str>) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let (host, port) = match bind {
        Some(bind) => parse_bind_address(bind, settings.port)?,
        None => (settings.host.clone(), settings.port),
    };

    println!(
        "{} Starting Cumulus server at http://{}:{}",
        style("→").cyan(),
        host,
        port
    );
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings, &host, port).await
}

/// Download one URL with a progress bar, then exit.
async fn cmd_fetch(settings: &Settings, url: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let downloads_dir = match output {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let config = DownloadConfig {
        downloads_dir,
        ..settings.download_config()
    };
    let service = DownloadService::new(Arc::new(MemoryDownloadStore::new()), config)?;

    let mut events = service.events().subscribe();
    let (record, warning) = service.create(url).await?;

    if let Some(reason) = warning {
        println!(
            "{} Probe failed ({}); attempting the transfer anyway",
            style("!").yellow(),
            reason
        );
        service.resume(record.id).await?;
    }

    println!(
        "{} Downloading {} -> {}",
        style("→").cyan(),
        record.requested_url,
        record.filename
    );

    let progress = FetchProgress::new(record.total_size);
    loop {
        match events.recv().await {
            Ok(event) if event.id() == record.id => match event {
                DownloadEvent::Progress {
                    downloaded_size,
                    total_size,
                    speed,
                    ..
                } => progress.update(downloaded_size, total_size, speed),
                DownloadEvent::Completed { .. } => {
                    progress.finish();
                    break;
                }
                DownloadEvent::Error { message, .. } => {
                    progress.abandon();
                    anyhow::bail!("download failed: {message}");
                }
                DownloadEvent::Paused { .. } | DownloadEvent::Cancelled { .. } => {}
            },
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => {
                anyhow::bail!("event channel closed before the download finished");
            }
        }
    }

    let finished = service
        .get(record.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("download record disappeared"))?;
    println!(
        "{} Saved {} ({})",
        style("✓").green(),
        finished.local_path.display(),
        crate::utils::format_bytes(finished.downloaded_size)
    );
    Ok(())
}

/// Parse a bind address that can be:
/// - Just a port: "3030" -> 127.0.0.1:3030
/// - Just a host: "0.0.0.0" -> 0.0.0.0:<default>
/// - Host and port: "0.0.0.0:3030" -> 0.0.0.0:3030
fn parse_bind_address(bind: &str, default_port: u16) -> anyhow::Result<(String, u16)> {
    if let Ok(port) = bind.parse::<u16>() {
        return Ok(("127.0.0.1".to_string(), port));
    }

    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return Ok((host.to_string(), port));
        }
    }

    Ok((bind.to_string(), default_port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_address() {
        assert_eq!(
            parse_bind_address("3030", 8080).unwrap(),
            ("127.0.0.1".to_string(), 3030)
        );
        assert_eq!(
            parse_bind_address("0.0.0.0", 8080).unwrap(),
            ("0.0.0.0".to_string(), 8080)
        );
        assert_eq!(
            parse_bind_address("0.0.0.0:9090", 8080).unwrap(),
            ("0.0.0.0".to_string(), 9090)
        );
    }
}
