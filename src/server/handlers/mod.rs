//! Request handlers.

mod downloads_api;
mod events;

pub use downloads_api::{
    api_status, create_download, delete_download, download_file, list_downloads, pause_download,
    resume_download,
};
pub use events::download_events;
