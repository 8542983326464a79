//! Live download events.
//!
//! Fan-out over a broadcast channel: every subscriber sees each event at
//! most once, there is no backlog or replay. An observer connecting
//! mid-transfer reconciles through the persisted records instead.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted as a download moves through its lifecycle.
///
/// Events for a single download id are emitted in transition order; no
/// ordering holds across different downloads.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DownloadEvent {
    Progress {
        id: Uuid,
        downloaded_size: u64,
        total_size: u64,
        /// Completion percentage, 0.0 when the total is unknown.
        progress: f64,
        /// Instantaneous throughput in bytes/sec.
        speed: f64,
    },
    Completed {
        id: Uuid,
    },
    Error {
        id: Uuid,
        message: String,
    },
    Paused {
        id: Uuid,
    },
    Cancelled {
        id: Uuid,
    },
}

impl DownloadEvent {
    pub fn progress(id: Uuid, downloaded: u64, total: u64, speed: f64) -> Self {
        let progress = if total > 0 {
            (downloaded as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self::Progress {
            id,
            downloaded_size: downloaded,
            total_size: total,
            progress,
            speed,
        }
    }

    /// The download this event belongs to.
    pub fn id(&self) -> Uuid {
        match self {
            Self::Progress { id, .. }
            | Self::Completed { id }
            | Self::Error { id, .. }
            | Self::Paused { id }
            | Self::Cancelled { id } => *id,
        }
    }
}

/// Best-effort fan-out of download events to all current observers.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<DownloadEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.tx.subscribe()
    }

    /// Deliver an event to current subscribers. Having none is not an error.
    pub fn emit(&self, event: DownloadEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let events = EventBroadcaster::new();
        let mut a = events.subscribe();
        let mut b = events.subscribe();
        let id = Uuid::new_v4();

        events.emit(DownloadEvent::Completed { id });

        assert_eq!(a.recv().await.unwrap().id(), id);
        assert_eq!(b.recv().await.unwrap().id(), id);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_prior_events() {
        let events = EventBroadcaster::new();
        let mut early = events.subscribe();
        events.emit(DownloadEvent::Paused { id: Uuid::new_v4() });

        let mut late = events.subscribe();
        assert!(early.recv().await.is_ok());
        assert!(matches!(
            late.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let events = EventBroadcaster::new();
        events.emit(DownloadEvent::Cancelled { id: Uuid::new_v4() });
    }

    #[test]
    fn test_progress_event_wire_shape() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(DownloadEvent::progress(id, 50, 200, 10.0)).unwrap();
        assert_eq!(json["kind"], "progress");
        assert_eq!(json["downloadedSize"], 50);
        assert_eq!(json["totalSize"], 200);
        assert_eq!(json["progress"], 25.0);
        assert_eq!(json["speed"], 10.0);
    }
}
