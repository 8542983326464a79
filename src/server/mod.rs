//! Web server for the personal cloud daemon.
//!
//! Exposes the remote download manager: record CRUD signals over REST and a
//! WebSocket live channel for progress events. Authentication is left to a
//! fronting proxy; the daemon serves a single owner.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::repository::DownloadStore;
use crate::services::download::DownloadService;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub downloads: Arc<DownloadService>,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let store = settings.create_store();
        store.init().await?;
        let downloads = DownloadService::new(store, settings.download_config())?;
        Ok(Self { downloads })
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings).await?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
