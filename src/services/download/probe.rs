//! Resource probing.
//!
//! Resolves a URL's final target, display filename, declared size and
//! range support with a metadata-only HEAD request before any bytes are
//! committed to disk.

use chrono::Utc;
use reqwest::header;
use reqwest::{Client, Method};
use url::Url;

use super::DownloadError;
use crate::client::{follow_redirects, parse_content_disposition_filename};

/// Metadata resolved for a remote resource.
#[derive(Debug, Clone)]
pub struct ResourceProbe {
    pub resolved_url: Url,
    pub filename: String,
    /// Declared size in bytes; 0 when the server did not say.
    pub total_size: u64,
    pub content_type: Option<String>,
    /// Whether the server advertises byte-range acceptance. A resume against
    /// a server that does not honor ranges restarts from zero (observable in
    /// the log and a zeroed progress event), it is never guessed silently.
    pub supports_range: bool,
}

/// Probe a URL, following redirects up to `max_redirects` hops.
pub async fn probe(
    client: &Client,
    url: Url,
    max_redirects: usize,
) -> Result<ResourceProbe, DownloadError> {
    let (resolved_url, response) =
        follow_redirects(client, Method::HEAD, url, None, max_redirects).await?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Unreachable {
            status: status.as_u16(),
        });
    }

    let headers = response.headers();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
    let total_size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let supports_range = headers
        .get(header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("bytes"))
        .unwrap_or(false);

    let filename = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_disposition_filename)
        .or_else(|| filename_from_url(&resolved_url))
        .unwrap_or_else(|| synthesized_filename(content_type.as_deref()));

    Ok(ResourceProbe {
        resolved_url,
        filename,
        total_size,
        content_type,
        supports_range,
    })
}

/// Last non-empty path segment of the URL, when it carries an extension.
pub fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()?;
    if !segment.contains('.') {
        return None;
    }
    let decoded = urlencoding::decode(segment).ok()?;
    let name = decoded.trim();
    if name.is_empty() || !name.contains('.') {
        None
    } else {
        Some(name.to_string())
    }
}

/// Name used when neither headers nor the URL yield one: a timestamped stem
/// plus an extension looked up from the content type, when known.
pub fn synthesized_filename(content_type: Option<&str>) -> String {
    let stem = format!("download_{}", Utc::now().timestamp());
    match content_type.and_then(extension_for_mime) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

/// Fallback name for a URL whose probe failed: the URL segment when usable,
/// a bare synthesized stem otherwise.
pub fn fallback_filename(url: &Url) -> String {
    filename_from_url(url).unwrap_or_else(|| synthesized_filename(None))
}

fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    // Common types mapped by hand; mime_guess covers the long tail but its
    // alphabetical extension lists pick oddities like "jpe" for image/jpeg.
    match content_type {
        "text/plain" => Some("txt"),
        "text/html" => Some("html"),
        "text/csv" => Some("csv"),
        "application/pdf" => Some("pdf"),
        "application/zip" => Some("zip"),
        "application/gzip" => Some("gz"),
        "application/json" => Some("json"),
        "application/xml" | "text/xml" => Some("xml"),
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "audio/mpeg" => Some("mp3"),
        "audio/ogg" => Some("ogg"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "application/octet-stream" => None,
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied()),
    }
}
