use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    CountingDown,
    Recording,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: SessionStatus,
    pub exercise_id: String,
    pub attempt_id: Option<String>,
    pub countdown_remaining: Option<i32>,
    pub elapsed_secs: f64,
    pub final_elapsed_secs: f64,
    pub clinical_score: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    /// Start of the current recording; elapsed time is derived from it.
    #[serde(skip)]
    pub recording_anchor: Option<Instant>,
}

impl SessionState {
    pub fn new(exercise_id: impl Into<String>) -> Self {
        Self {
            status: SessionStatus::Idle,
            exercise_id: exercise_id.into(),
            attempt_id: None,
            countdown_remaining: None,
            elapsed_secs: 0.0,
            final_elapsed_secs: 0.0,
            clinical_score: None,
            started_at: None,
            recording_anchor: None,
        }
    }

    pub fn begin_countdown(&mut self, ticks: i32) {
        self.status = SessionStatus::CountingDown;
        self.countdown_remaining = Some(ticks);
    }

    /// Decrement the countdown and return the new remaining count.
    pub fn tick_countdown(&mut self) -> i32 {
        let remaining = self.countdown_remaining.unwrap_or(0) - 1;
        self.countdown_remaining = Some(remaining);
        remaining
    }

    pub fn cancel_countdown(&mut self) {
        self.status = SessionStatus::Idle;
        self.countdown_remaining = None;
    }

    pub fn begin_recording(&mut self, attempt_id: String, start_at: DateTime<Utc>, now: Instant) {
        self.status = SessionStatus::Recording;
        self.attempt_id = Some(attempt_id);
        self.countdown_remaining = None;
        self.elapsed_secs = 0.0;
        self.clinical_score = None;
        self.started_at = Some(start_at);
        self.recording_anchor = Some(now);
    }

    pub fn current_elapsed_secs(&self) -> f64 {
        match (self.status, self.recording_anchor) {
            (SessionStatus::Recording, Some(anchor)) => anchor.elapsed().as_secs_f64(),
            _ => self.elapsed_secs,
        }
    }

    pub fn sync_elapsed_from_anchor(&mut self) {
        if self.status == SessionStatus::Recording {
            self.elapsed_secs = self.current_elapsed_secs();
        }
    }

    /// Freeze the clock; elapsed time becomes the attempt's final time.
    pub fn finish(&mut self) {
        self.sync_elapsed_from_anchor();
        self.status = SessionStatus::Finished;
        self.final_elapsed_secs = self.elapsed_secs;
        self.elapsed_secs = 0.0;
        self.recording_anchor = None;
    }
}

/// Two-decimal rounding used for displayed times.
pub fn display_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
