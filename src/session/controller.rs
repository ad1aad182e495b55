use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capture::{
    CanvasRenderer, CaptureController, CaptureDevice, FrameSink, PoseEstimator, SamplerConfig,
};
use crate::comparison::{ComparisonScheduler, ComparisonWindow};
use crate::error::SessionError;
use crate::events::{
    emit_json, EventSink, CLINICAL_SCORE_FAILED, CLINICAL_SCORE_RESOLVED, COUNTDOWN_TICK,
    FEEDBACK_UPDATED, SESSION_STATE_CHANGED,
};
use crate::feedback::FeedbackAggregator;
use crate::models::{FeedbackMessage, Frame};
use crate::reference::{ReferenceAssets, ReferencePlayer, ReferenceSeries};
use crate::scoring::{ClinicalScore, ClinicalScoreFinalizer, ScoringService};
use crate::settings::SessionSettings;

use super::buffer::SessionSeries;
use super::state::{display_secs, SessionState, SessionStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub elapsed_secs: f64,
    pub frame_count: usize,
    pub current_feedback: Vec<FeedbackMessage>,
    pub feedback_log: Vec<FeedbackMessage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateChangedEvent {
    state: SessionState,
    elapsed_secs: f64,
    final_elapsed_secs: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CountdownTickEvent {
    remaining: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackUpdatedEvent {
    attempt_id: Option<String>,
    window_token: u64,
    current: Vec<FeedbackMessage>,
    log_len: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClinicalScoreEvent<'a> {
    attempt_id: &'a str,
    score: &'a ClinicalScore,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClinicalScoreFailedEvent<'a> {
    attempt_id: &'a str,
    reason: String,
}

enum StopCause {
    Manual,
    AutoStop(String),
}

/// Everything the state machine mutates. Only touched under the controller's lock.
struct SessionCore {
    state: SessionState,
    series: SessionSeries,
    feedback: FeedbackAggregator,
    reference: Option<ReferenceSeries>,
    next_window_token: u64,
    capture_failure: Option<String>,
}

/// Drives one exercise: countdown, recording, auto-stop and final scoring.
#[derive(Clone)]
pub struct SessionController {
    core: Arc<Mutex<SessionCore>>,
    events: Arc<dyn EventSink>,
    assets: ReferenceAssets,
    player: Arc<dyn ReferencePlayer>,
    scheduler: Arc<ComparisonScheduler>,
    finalizer: Arc<ClinicalScoreFinalizer>,
    countdown: Arc<Mutex<Option<JoinHandle<()>>>>,
    auto_stop: Arc<Mutex<Option<JoinHandle<()>>>>,
    background: CancellationToken,
    countdown_ticks: i32,
    tick_interval: Duration,
    recording_duration: Duration,
}

impl SessionController {
    pub fn new(
        settings: &SessionSettings,
        scoring: Arc<dyn ScoringService>,
        assets: ReferenceAssets,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let exercise_id = assets.descriptor().exercise_id.clone();
        Self {
            core: Arc::new(Mutex::new(SessionCore {
                state: SessionState::new(exercise_id.clone()),
                series: SessionSeries::new(),
                feedback: FeedbackAggregator::new(),
                reference: None,
                next_window_token: 0,
                capture_failure: Some("capture not started".into()),
            })),
            events,
            player: assets.player(),
            scheduler: Arc::new(ComparisonScheduler::new(scoring.clone(), exercise_id, settings)),
            finalizer: Arc::new(ClinicalScoreFinalizer::new(scoring, settings)),
            assets,
            countdown: Arc::new(Mutex::new(None)),
            auto_stop: Arc::new(Mutex::new(None)),
            background: CancellationToken::new(),
            countdown_ticks: settings.countdown_ticks,
            tick_interval: settings.countdown_tick(),
            recording_duration: settings.recording_duration(),
        }
    }

    pub async fn get_state(&self) -> SessionState {
        let mut core = self.core.lock().await;
        core.state.sync_elapsed_from_anchor();
        core.state.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let mut core = self.core.lock().await;
        core.state.sync_elapsed_from_anchor();
        SessionSnapshot {
            elapsed_secs: display_secs(core.state.current_elapsed_secs()),
            frame_count: core.series.len(),
            current_feedback: core.feedback.current().to_vec(),
            feedback_log: core.feedback.log().to_vec(),
            state: core.state.clone(),
        }
    }

    /// Open the camera and feed its frames into this session.
    pub async fn attach_capture(
        &self,
        capture: &mut CaptureController,
        device: Arc<dyn CaptureDevice>,
        estimator: Arc<dyn PoseEstimator>,
        renderer: Arc<dyn CanvasRenderer>,
        settings: &SessionSettings,
    ) -> Result<()> {
        let sink: Arc<dyn FrameSink> = Arc::new(self.clone());
        let result = capture
            .start_capture(
                device,
                estimator,
                renderer,
                sink,
                SamplerConfig::from_settings(settings),
                (settings.capture_width, settings.capture_height),
            )
            .await;

        match &result {
            Ok(()) => self.mark_capture_live().await,
            Err(err) => self.mark_capture_unavailable(format!("{err:#}")).await,
        }
        result
    }

    pub async fn mark_capture_live(&self) {
        self.core.lock().await.capture_failure = None;
    }

    pub async fn mark_capture_unavailable(&self, reason: impl Into<String>) {
        let reason = reason.into();
        log_error!("capture unavailable: {}", reason);
        self.core.lock().await.capture_failure = Some(reason);
    }

    /// Begin the countdown. Allowed from `Idle` or `Finished`, with live capture and
    /// fully loaded reference assets.
    pub async fn start(&self) -> Result<SessionState> {
        let snapshot = {
            let mut core = self.core.lock().await;
            let status = core.state.status;
            if !matches!(status, SessionStatus::Idle | SessionStatus::Finished) {
                return Err(SessionError::InvalidTransition {
                    command: "start",
                    status,
                }
                .into());
            }
            if let Some(reason) = &core.capture_failure {
                return Err(SessionError::CaptureUnavailable(reason.clone()).into());
            }

            let readiness = self.assets.current();
            if !readiness.is_ready() {
                return Err(match readiness.failure() {
                    Some(reason) => SessionError::ReferenceLoad(reason),
                    None => SessionError::ReferenceNotReady,
                }
                .into());
            }

            core.reference = readiness.series;
            core.state.begin_countdown(self.countdown_ticks);
            core.state.clone()
        };

        log_info!(
            "countdown started for {} ({} ticks)",
            snapshot.exercise_id,
            self.countdown_ticks
        );

        self.cancel_timers().await;
        self.emit_state(&snapshot);
        emit_json(
            self.events.as_ref(),
            COUNTDOWN_TICK,
            &CountdownTickEvent {
                remaining: self.countdown_ticks,
            },
        );
        self.spawn_countdown().await;

        Ok(snapshot)
    }

    /// Stop the attempt. During the countdown this returns to `Idle`; while recording
    /// it finishes the attempt and schedules clinical scoring.
    pub async fn stop(&self) -> Result<SessionState> {
        let cancelled = {
            let mut core = self.core.lock().await;
            match core.state.status {
                SessionStatus::CountingDown => {
                    core.state.cancel_countdown();
                    Some(core.state.clone())
                }
                SessionStatus::Recording => None,
                status => {
                    return Err(SessionError::InvalidTransition {
                        command: "stop",
                        status,
                    }
                    .into())
                }
            }
        };

        match cancelled {
            Some(state) => {
                if let Some(handle) = self.countdown.lock().await.take() {
                    handle.abort();
                }
                log_info!("countdown cancelled for {}", state.exercise_id);
                self.emit_state(&state);
                Ok(state)
            }
            None => self.finish_recording(StopCause::Manual).await,
        }
    }

    /// Run clinical scoring again for a finished attempt whose score is still unresolved.
    pub async fn retry_clinical_score(&self) -> Result<()> {
        let (attempt_id, session_csv, feedback_count) = {
            let core = self.core.lock().await;
            let status = core.state.status;
            match (&core.state.attempt_id, status, core.state.clinical_score) {
                (Some(attempt_id), SessionStatus::Finished, None) => (
                    attempt_id.clone(),
                    core.series.to_csv(),
                    core.feedback.log_len(),
                ),
                _ => {
                    return Err(SessionError::InvalidTransition {
                        command: "retry clinical score",
                        status,
                    }
                    .into())
                }
            }
        };

        log_info!("retrying clinical score for attempt {}", attempt_id);
        self.spawn_finalizer(attempt_id, session_csv, feedback_count);
        Ok(())
    }

    /// Cancel every timer and in-flight scoring task. The session is unusable afterwards.
    pub async fn shutdown(&self) {
        self.cancel_timers().await;
        self.background.cancel();
        if let Err(err) = self.player.pause_and_rewind() {
            log_warn!("failed to pause reference playback on shutdown: {err:#}");
        }
        log_info!("session controller shut down");
    }

    async fn spawn_countdown(&self) {
        let mut countdown_guard = self.countdown.lock().await;
        if let Some(handle) = countdown_guard.take() {
            handle.abort();
        }

        let this = self.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            loop {
                interval.tick().await;

                let remaining = {
                    let mut core = this.core.lock().await;
                    if core.state.status != SessionStatus::CountingDown {
                        break;
                    }
                    core.state.tick_countdown()
                };

                if remaining < 0 {
                    this.enter_recording().await;
                    break;
                }

                emit_json(
                    this.events.as_ref(),
                    COUNTDOWN_TICK,
                    &CountdownTickEvent { remaining },
                );
            }
        });

        *countdown_guard = Some(handle);
    }

    async fn enter_recording(&self) {
        let attempt_id = Uuid::new_v4().to_string();
        {
            let mut core = self.core.lock().await;
            if core.state.status != SessionStatus::CountingDown {
                return;
            }
            core.series.reset();
            core.feedback.clear();
            core.state
                .begin_recording(attempt_id.clone(), Utc::now(), Instant::now());

            // Everything that follows from `Recording` happens under the lock that publishes it.
            // Lock order: `core`, then `auto_stop`.
            if let Err(err) = self.player.play_from_start() {
                log_warn!("failed to start reference playback: {err:#}");
            }
            self.spawn_auto_stop(attempt_id.clone()).await;

            log_info!("recording attempt {} for {}", attempt_id, core.state.exercise_id);
            self.emit_state(&core.state);
            emit_json(
                self.events.as_ref(),
                FEEDBACK_UPDATED,
                &FeedbackUpdatedEvent {
                    attempt_id: Some(attempt_id),
                    window_token: 0,
                    current: Vec::new(),
                    log_len: 0,
                },
            );
        }

        // Called from the countdown task itself: release the slot without aborting.
        drop(self.countdown.lock().await.take());
    }

    async fn spawn_auto_stop(&self, attempt_id: String) {
        let mut auto_stop_guard = self.auto_stop.lock().await;
        if let Some(handle) = auto_stop_guard.take() {
            handle.abort();
        }

        let this = self.clone();
        let duration = self.recording_duration;
        let handle = tokio::spawn(async move {
            time::sleep(duration).await;
            log_info!("auto-stop after {:?} for attempt {}", duration, attempt_id);
            if let Err(err) = this.finish_recording(StopCause::AutoStop(attempt_id)).await {
                log_info!("auto-stop skipped: {err}");
            }
        });

        *auto_stop_guard = Some(handle);
    }

    async fn cancel_timers(&self) {
        if let Some(handle) = self.countdown.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.auto_stop.lock().await.take() {
            handle.abort();
        }
    }

    async fn finish_recording(&self, cause: StopCause) -> Result<SessionState> {
        let (snapshot, attempt_id, session_csv, feedback_count) = {
            let mut core = self.core.lock().await;
            let status = core.state.status;
            if status != SessionStatus::Recording {
                return Err(SessionError::InvalidTransition {
                    command: "stop",
                    status,
                }
                .into());
            }
            let attempt_id = core.state.attempt_id.clone().unwrap_or_default();
            if let StopCause::AutoStop(expected) = &cause {
                if *expected != attempt_id {
                    return Err(SessionError::InvalidTransition {
                        command: "auto-stop",
                        status,
                    }
                    .into());
                }
            }

            core.state.finish();
            (
                core.state.clone(),
                attempt_id,
                core.series.to_csv(),
                core.feedback.log_len(),
            )
        };

        {
            let handle = self.auto_stop.lock().await.take();
            if let (Some(handle), StopCause::Manual) = (handle, &cause) {
                handle.abort();
            }
        }

        if let Err(err) = self.player.pause_and_rewind() {
            log_warn!("failed to rewind reference playback: {err:#}");
        }

        log_info!(
            "attempt {} finished after {:.2}s with {} corrections",
            attempt_id,
            snapshot.final_elapsed_secs,
            feedback_count
        );
        self.emit_state(&snapshot);
        self.spawn_finalizer(attempt_id, session_csv, feedback_count);

        Ok(snapshot)
    }

    fn spawn_finalizer(&self, attempt_id: String, session_csv: String, feedback_count: usize) {
        let this = self.clone();
        let token = self.background.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = this.resolve_clinical_score(attempt_id, session_csv, feedback_count) => {}
            }
        });
    }

    async fn resolve_clinical_score(
        &self,
        attempt_id: String,
        session_csv: String,
        feedback_count: usize,
    ) {
        let exercise_id = self.assets.descriptor().exercise_id.clone();
        let result = self
            .finalizer
            .finalize(&exercise_id, &session_csv, feedback_count)
            .await;

        match result {
            Ok(score) => {
                let applied = {
                    let mut core = self.core.lock().await;
                    if core.state.status == SessionStatus::Finished
                        && core.state.attempt_id.as_deref() == Some(attempt_id.as_str())
                    {
                        core.state.clinical_score = Some(score.value);
                        Some(core.state.clone())
                    } else {
                        None
                    }
                };

                match applied {
                    Some(state) => {
                        log_info!(
                            "clinical score for attempt {}: {} ({:?}, {:?})",
                            attempt_id,
                            score.value,
                            score.source,
                            score.verdict
                        );
                        emit_json(
                            self.events.as_ref(),
                            CLINICAL_SCORE_RESOLVED,
                            &ClinicalScoreEvent {
                                attempt_id: &attempt_id,
                                score: &score,
                            },
                        );
                        self.emit_state(&state);
                    }
                    None => {
                        log_info!("discarding clinical score for superseded attempt {}", attempt_id);
                    }
                }
            }
            Err(err) => {
                log_warn!("clinical scoring failed for attempt {}: {err:#}", attempt_id);
                emit_json(
                    self.events.as_ref(),
                    CLINICAL_SCORE_FAILED,
                    &ClinicalScoreFailedEvent {
                        attempt_id: &attempt_id,
                        reason: format!("{err:#}"),
                    },
                );
            }
        }
    }

    fn spawn_window(&self, window: ComparisonWindow) {
        let this = self.clone();
        let token = self.background.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = this.evaluate_window(window) => {}
            }
        });
    }

    async fn evaluate_window(&self, window: ComparisonWindow) {
        let outcome = self.scheduler.evaluate(window).await;
        if outcome.failures > 0 {
            log_warn!(
                "window {} had {} failed comparisons; no signal for those pairs",
                outcome.token,
                outcome.failures
            );
        }

        let update = {
            let mut core = self.core.lock().await;
            if core.state.attempt_id.as_deref() != Some(outcome.attempt_id.as_str()) {
                log_info!(
                    "dropping window {} from superseded attempt {}",
                    outcome.token,
                    outcome.attempt_id
                );
                None
            } else if !core.feedback.apply_window(outcome.token, outcome.findings) {
                log_info!("dropping stale window {}", outcome.token);
                None
            } else {
                Some(FeedbackUpdatedEvent {
                    attempt_id: core.state.attempt_id.clone(),
                    window_token: outcome.token,
                    current: core.feedback.current().to_vec(),
                    log_len: core.feedback.log_len(),
                })
            }
        };

        if let Some(update) = update {
            emit_json(self.events.as_ref(), FEEDBACK_UPDATED, &update);
        }
    }

    fn emit_state(&self, state: &SessionState) {
        emit_json(
            self.events.as_ref(),
            SESSION_STATE_CHANGED,
            &StateChangedEvent {
                elapsed_secs: display_secs(state.current_elapsed_secs()),
                final_elapsed_secs: display_secs(state.final_elapsed_secs),
                state: state.clone(),
            },
        );
    }
}

#[async_trait]
impl FrameSink for SessionController {
    /// Record `frame` if an attempt is running and fire a comparison window when one completes.
    async fn submit(&self, frame: Frame) {
        let window = {
            let mut guard = self.core.lock().await;
            let core = &mut *guard;
            if core.state.status != SessionStatus::Recording {
                return;
            }
            core.state.sync_elapsed_from_anchor();
            core.series.append(frame);

            let len = core.series.len();
            match (&core.reference, &core.state.attempt_id) {
                (Some(reference), Some(attempt_id)) if self.scheduler.should_trigger(len) => {
                    core.next_window_token += 1;
                    Some(self.scheduler.build_window(
                        core.next_window_token,
                        attempt_id,
                        &core.series,
                        reference,
                    ))
                }
                _ => None,
            }
        };

        if let Some(window) = window {
            self.spawn_window(window);
        }
    }
}
