//! Registry of in-flight transfers.
//!
//! A concurrency-safe map from download id to the handle controlling its
//! worker. `attach` refuses a second handle for the same id, which is what
//! enforces the one-worker-per-record invariant. Entries never leave this
//! module; callers interact through attach/detach/signal only.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Interruption requested for a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Pause,
    Cancel,
}

/// Control handle for one running worker. Destroyed on pause, cancel,
/// completion or error.
struct TransferHandle {
    pause: CancellationToken,
    cancel: CancellationToken,
}

/// Token clones held by the worker itself.
#[derive(Clone)]
pub struct WorkerSignals {
    pub pause: CancellationToken,
    pub cancel: CancellationToken,
}

#[derive(Default)]
pub struct TransferRegistry {
    active: Mutex<HashMap<Uuid, TransferHandle>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, TransferHandle>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a worker for `id`, handing back its interruption tokens.
    /// Fails when a worker is already attached.
    pub fn attach(&self, id: Uuid) -> Option<WorkerSignals> {
        let mut active = self.lock();
        if active.contains_key(&id) {
            return None;
        }
        let handle = TransferHandle {
            pause: CancellationToken::new(),
            cancel: CancellationToken::new(),
        };
        let signals = WorkerSignals {
            pause: handle.pause.clone(),
            cancel: handle.cancel.clone(),
        };
        active.insert(id, handle);
        Some(signals)
    }

    /// Remove the handle for `id`. Returns false when none was attached.
    pub fn detach(&self, id: Uuid) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Request interruption of the transfer attached to `id`.
    /// A no-op returning false when nothing is attached (already finished).
    pub fn signal(&self, id: Uuid, kind: SignalKind) -> bool {
        let active = self.lock();
        match active.get(&id) {
            Some(handle) => {
                match kind {
                    SignalKind::Pause => handle.pause.cancel(),
                    SignalKind::Cancel => handle.cancel.cancel(),
                }
                true
            }
            None => false,
        }
    }

    /// Whether a worker is currently attached to `id`.
    pub fn is_attached(&self, id: Uuid) -> bool {
        self.lock().contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_is_exclusive() {
        let registry = TransferRegistry::new();
        let id = Uuid::new_v4();

        assert!(registry.attach(id).is_some());
        assert!(registry.attach(id).is_none());

        assert!(registry.detach(id));
        assert!(registry.attach(id).is_some());
    }

    #[test]
    fn test_signal_reaches_worker_tokens() {
        let registry = TransferRegistry::new();
        let id = Uuid::new_v4();
        let signals = registry.attach(id).unwrap();

        assert!(registry.signal(id, SignalKind::Pause));
        assert!(signals.pause.is_cancelled());
        assert!(!signals.cancel.is_cancelled());
    }

    #[test]
    fn test_signal_without_worker_is_noop() {
        let registry = TransferRegistry::new();
        assert!(!registry.signal(Uuid::new_v4(), SignalKind::Cancel));
    }

    #[test]
    fn test_detach_missing() {
        let registry = TransferRegistry::new();
        assert!(!registry.detach(Uuid::new_v4()));
    }
}
