//! Streaming transfer worker.
//!
//! One worker runs per attached download. Pause and cancel arrive as token
//! cancellations raced against the in-flight chunk read, so reaction latency
//! is bounded by a single read and the socket is dropped, not drained.

use std::time::Instant;

use futures::StreamExt;
use reqwest::{header, Method, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use url::Url;

use super::registry::WorkerSignals;
use super::{DownloadError, DownloadEvent, DownloadService};
use crate::client::{content_range_total, follow_redirects, ClientError};
use crate::models::DownloadRecord;
use crate::repository::DownloadStore;

/// How a transfer attempt ended.
pub(crate) enum TransferOutcome {
    Completed { bytes: u64, total: u64 },
    Paused { bytes: u64 },
    Cancelled,
    Failed { bytes: u64, message: String },
}

enum Flow {
    Completed { total: u64 },
    Paused,
    Cancelled,
}

/// Run one transfer attempt for `record`, resuming at `offset`.
pub(crate) async fn run_transfer(
    service: &DownloadService,
    record: &DownloadRecord,
    offset: u64,
    signals: WorkerSignals,
) -> TransferOutcome {
    let mut written = offset;
    match stream_to_disk(service, record, offset, &signals, &mut written).await {
        Ok(Flow::Completed { total }) => TransferOutcome::Completed {
            bytes: written,
            total,
        },
        Ok(Flow::Paused) => TransferOutcome::Paused { bytes: written },
        Ok(Flow::Cancelled) => {
            // The record is being deleted; drop the partial file as well.
            let _ = tokio::fs::remove_file(&record.local_path).await;
            TransferOutcome::Cancelled
        }
        Err(err) => TransferOutcome::Failed {
            bytes: written,
            message: err.to_string(),
        },
    }
}

async fn stream_to_disk(
    service: &DownloadService,
    record: &DownloadRecord,
    resume_offset: u64,
    signals: &WorkerSignals,
    written: &mut u64,
) -> Result<Flow, DownloadError> {
    let url = Url::parse(&record.resolved_url)
        .map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;
    let range = (resume_offset > 0).then_some(resume_offset);

    let (final_url, response) = follow_redirects(
        &service.client,
        Method::GET,
        url,
        range,
        service.config.max_redirects,
    )
    .await?;
    tracing::debug!(id = %record.id, url = %final_url, status = %response.status(), "transfer connected");

    let status = response.status();
    let mut total = record.total_size;
    let mut offset = resume_offset;

    let mut file = if status == StatusCode::PARTIAL_CONTENT && resume_offset > 0 {
        if let Some(known) = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
        {
            total = known;
        } else if let Some(remaining) = response.content_length() {
            total = resume_offset + remaining;
        }
        OpenOptions::new().append(true).open(&record.local_path).await?
    } else if status.is_success() {
        if resume_offset > 0 {
            // Degraded path, not an error: the server ignored the range
            // request, so the local file restarts from zero.
            tracing::warn!(
                id = %record.id,
                "server ignored range request; restarting download from zero"
            );
            offset = 0;
            *written = 0;
            let _ = service
                .store
                .update_progress(record.id, 0, 0.0, total)
                .await;
            service
                .events
                .emit(DownloadEvent::progress(record.id, 0, total, 0.0));
        }
        if let Some(length) = response.content_length() {
            if length > 0 {
                total = length;
            }
        }
        File::create(&record.local_path).await?
    } else {
        return Err(DownloadError::Unreachable {
            status: status.as_u16(),
        });
    };

    *written = offset;
    let mut stream = response.bytes_stream();
    let mut window_start = Instant::now();
    let mut window_bytes: u64 = 0;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = signals.cancel.cancelled() => {
                let _ = file.flush().await;
                return Ok(Flow::Cancelled);
            }
            _ = signals.pause.cancelled() => {
                file.flush().await?;
                let _ = service
                    .store
                    .update_progress(record.id, *written, 0.0, total)
                    .await;
                return Ok(Flow::Paused);
            }
            chunk = stream.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                file.write_all(&bytes).await?;
                *written += bytes.len() as u64;
                window_bytes += bytes.len() as u64;

                if total > 0 && *written > total {
                    return Err(DownloadError::LengthMismatch {
                        expected: total,
                        actual: *written,
                    });
                }

                let elapsed = window_start.elapsed();
                if elapsed >= service.config.progress_interval {
                    let speed = window_bytes as f64 / elapsed.as_secs_f64();
                    let _ = service
                        .store
                        .update_progress(record.id, *written, speed, total)
                        .await;
                    service
                        .events
                        .emit(DownloadEvent::progress(record.id, *written, total, speed));
                    window_start = Instant::now();
                    window_bytes = 0;
                }
            }
            Some(Err(e)) => {
                let _ = file.flush().await;
                return Err(ClientError::from(e).into());
            }
            None => break,
        }
    }

    file.flush().await?;
    if total > 0 && *written != total {
        return Err(DownloadError::LengthMismatch {
            expected: total,
            actual: *written,
        });
    }

    Ok(Flow::Completed { total })
}
