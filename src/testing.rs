//! In-process doubles for the session's collaborators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::events::EventSink;
use crate::reference::ReferencePlayer;
use crate::scoring::ScoringService;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

type CostFn = Box<dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync>;

#[derive(Debug, Clone)]
pub struct FeedbackRequest {
    pub reference: Vec<f64>,
    pub current: Vec<f64>,
}

pub struct StubScoring {
    cost: Option<CostFn>,
    clinical: Option<f64>,
    delay: Option<Duration>,
    clinical_failures: AtomicUsize,
    feedback_requests: Mutex<Vec<FeedbackRequest>>,
    clinical_calls: AtomicUsize,
}

impl StubScoring {
    pub fn with_cost(cost: f64) -> Self {
        Self::with_cost_fn(move |_, _| cost)
    }

    pub fn with_cost_fn(cost: impl Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            cost: Some(Box::new(cost)),
            clinical: Some(0.0),
            delay: None,
            clinical_failures: AtomicUsize::new(0),
            feedback_requests: Mutex::new(Vec::new()),
            clinical_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_clinical(score: f64) -> Self {
        Self::with_cost(0.0).clinical(score)
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self {
            cost: None,
            clinical: None,
            ..Self::with_cost(0.0)
        }
    }

    pub fn clinical(mut self, score: f64) -> Self {
        self.clinical = Some(score);
        self
    }

    /// The first `count` clinical calls fail before the configured score is returned.
    pub fn failing_clinical_calls(self, count: usize) -> Self {
        self.clinical_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn feedback_calls(&self) -> usize {
        lock(&self.feedback_requests).len()
    }

    pub fn feedback_requests(&self) -> Vec<FeedbackRequest> {
        lock(&self.feedback_requests).clone()
    }

    pub fn clinical_calls(&self) -> usize {
        self.clinical_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringService for StubScoring {
    async fn dissimilarity(
        &self,
        _exercise_id: &str,
        reference: &[f64],
        current: &[f64],
    ) -> Result<f64> {
        lock(&self.feedback_requests).push(FeedbackRequest {
            reference: reference.to_vec(),
            current: current.to_vec(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.cost
            .as_ref()
            .map(|cost| cost(reference, current))
            .ok_or_else(|| anyhow!("stub scoring unavailable"))
    }

    async fn clinical_score(&self, _exercise_id: &str, _session_csv: &str) -> Result<f64> {
        self.clinical_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .clinical_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("stub clinical scoring failed"));
        }
        self.clinical
            .ok_or_else(|| crate::error::SessionError::ScoringService("stub".into()).into())
    }
}

/// Records every emitted event.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingEvents {
    pub fn named(&self, name: &str) -> Vec<Value> {
        lock(&self.events)
            .iter()
            .filter(|(event, _)| event == name)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl EventSink for RecordingEvents {
    fn emit(&self, event: &str, payload: Value) {
        lock(&self.events).push((event.to_string(), payload));
    }
}

#[derive(Default)]
pub struct StubPlayer {
    playing: AtomicBool,
    pub starts: AtomicUsize,
    pub rewinds: AtomicUsize,
    fail_load: bool,
}

impl StubPlayer {
    /// Player whose media never loads.
    pub fn broken() -> Self {
        Self {
            fail_load: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ReferencePlayer for StubPlayer {
    async fn load(&self, url: &str) -> Result<()> {
        if self.fail_load {
            return Err(anyhow!("cannot load {url}"));
        }
        Ok(())
    }

    fn play_from_start(&self) -> Result<()> {
        self.playing.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pause_and_rewind(&self) -> Result<()> {
        self.playing.store(false, Ordering::SeqCst);
        self.rewinds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}
