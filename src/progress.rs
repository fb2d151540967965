use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// One progress report from a long-running round operation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
        }
    }
}

/// Receiver of progress reports. Called inline from the orchestrator, so
/// implementations must not block and must not panic.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every report.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Fans progress out to SSE subscribers and remembers the latest report
/// for status polling. Having no subscribers is fine.
pub struct BroadcastProgress {
    tx: broadcast::Sender<ProgressEvent>,
    latest: Mutex<Option<ProgressEvent>>,
}

impl BroadcastProgress {
    pub fn new(tx: broadcast::Sender<ProgressEvent>) -> Self {
        Self {
            tx,
            latest: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<ProgressEvent> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }

    pub fn reset(&self) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
    }
}

impl ProgressSink for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(event.clone());
        }
        let _ = self.tx.send(event);
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for std::sync::Arc<S> {
    fn report(&self, event: ProgressEvent) {
        (**self).report(event)
    }
}
