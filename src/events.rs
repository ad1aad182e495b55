//! Outbound notifications for whatever presents the session (UI, CLI, tests).

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

pub const SESSION_STATE_CHANGED: &str = "session-state-changed";
pub const COUNTDOWN_TICK: &str = "countdown-tick";
pub const FEEDBACK_UPDATED: &str = "feedback-updated";
pub const CLINICAL_SCORE_RESOLVED: &str = "clinical-score-resolved";
pub const CLINICAL_SCORE_FAILED: &str = "clinical-score-failed";
pub const REFERENCE_READINESS_CHANGED: &str = "reference-readiness-changed";

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

/// Serialize `payload` and hand it to `sink`. Serialization failures are logged and dropped.
pub fn emit_json<T: Serialize>(sink: &dyn EventSink, event: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => sink.emit(event, value),
        Err(err) => log::error!("failed to serialize {event} payload: {err}"),
    }
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub name: String,
    pub payload: Value,
}

/// Fan-out sink; every subscriber sees every event emitted after it subscribed.
#[derive(Clone)]
pub struct BroadcastEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl BroadcastEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEvents {
    fn emit(&self, event: &str, payload: Value) {
        // No receivers is not an error; the UI may not be attached yet.
        let _ = self.tx.send(SessionEvent {
            name: event.to_string(),
            payload,
        });
    }
}

/// Sink that only writes events to the log.
pub struct LogEvents;

impl EventSink for LogEvents {
    fn emit(&self, event: &str, payload: Value) {
        log::info!("[{event}] {payload}");
    }
}
