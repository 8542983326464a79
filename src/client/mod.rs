//! HTTP client shared by the prober and the transfer worker.
//!
//! Redirects are never followed implicitly: both the probe and the transfer
//! walk 3xx responses through the same bounded iterative loop, so adversarial
//! redirect chains cannot recurse and both phases resolve a URL identically.

mod response;

pub use response::{content_range_total, parse_content_disposition_filename};

use std::time::Duration;

use reqwest::header::{self, HeaderValue};
use reqwest::{Client, Method, Response};
use url::Url;

/// Errors raised while talking to the remote server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),
    #[error("redirect without a location header")]
    MissingLocation,
    #[error("invalid redirect location: {0}")]
    InvalidLocation(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Build the shared client.
///
/// `connect_timeout` bounds connection establishment and `read_timeout`
/// bounds a single stalled read; the data-transfer phase itself has no
/// overall deadline, long downloads are expected.
pub fn build_client(
    user_agent: &str,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Issue a request, walking redirects up to `max_hops` times.
///
/// Relative `Location` values are resolved against the URL that produced
/// them. Returns the final URL together with the final (non-3xx) response.
pub async fn follow_redirects(
    client: &Client,
    method: Method,
    mut url: Url,
    range_offset: Option<u64>,
    max_hops: usize,
) -> Result<(Url, Response), ClientError> {
    for _ in 0..=max_hops {
        let mut request = client.request(method.clone(), url.clone());
        if let Some(offset) = range_offset {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes={offset}-")) {
                request = request.header(header::RANGE, value);
            }
        }

        let response = request.send().await?;
        if !response.status().is_redirection() {
            return Ok((url, response));
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ClientError::MissingLocation)?;
        url = url
            .join(location)
            .map_err(|_| ClientError::InvalidLocation(location.to_string()))?;
    }

    Err(ClientError::TooManyRedirects(max_hops))
}
