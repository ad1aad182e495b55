use serde::Serialize;

use crate::models::{Axis, FeedbackMessage, JointName};

/// A joint/axis whose dissimilarity crossed the threshold in one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub joint: JointName,
    pub axis: Axis,
    pub cost: f64,
}

/// Turns per-window findings into the "current" correction set and the
/// cumulative log for the attempt.
#[derive(Debug, Default)]
pub struct FeedbackAggregator {
    current: Vec<FeedbackMessage>,
    log: Vec<FeedbackMessage>,
    next_ordinal: u64,
    last_applied_window: u64,
}

impl FeedbackAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one window's findings. Returns `false` without touching anything if a
    /// newer window has already been applied.
    ///
    /// Findings are numbered in joint-index order, x before y, whatever order they
    /// arrived in.
    pub fn apply_window(&mut self, window_token: u64, mut findings: Vec<Finding>) -> bool {
        if window_token <= self.last_applied_window {
            return false;
        }
        self.last_applied_window = window_token;

        findings.sort_by_key(|finding| (finding.joint, finding.axis));

        let messages: Vec<FeedbackMessage> = findings
            .into_iter()
            .map(|finding| {
                let ordinal = self.next_ordinal;
                self.next_ordinal += 1;
                FeedbackMessage::correction(finding.joint, finding.axis, ordinal)
            })
            .collect();

        self.log.extend(messages.iter().cloned());
        self.current = messages;
        true
    }

    /// Drop the current set and log for a new attempt. Ordinals keep counting.
    pub fn clear(&mut self) {
        self.current.clear();
        self.log.clear();
    }

    pub fn current(&self) -> &[FeedbackMessage] {
        &self.current
    }

    pub fn log(&self) -> &[FeedbackMessage] {
        &self.log
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }
}
