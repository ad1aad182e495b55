use std::{sync::Arc, time::Duration};

use tokio::task::JoinSet;

use crate::feedback::Finding;
use crate::models::{axis_values, Axis, JointName};
use crate::reference::ReferenceSeries;
use crate::scoring::ScoringService;
use crate::session::SessionSeries;
use crate::settings::SessionSettings;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// One joint/axis pair ready to send for scoring.
#[derive(Debug, Clone)]
pub struct AxisComparison {
    pub joint: JointName,
    pub axis: Axis,
    pub current: Vec<f64>,
    pub reference: Vec<f64>,
}

/// Everything needed to score one window, detached from the live buffers.
#[derive(Debug, Clone)]
pub struct ComparisonWindow {
    /// Monotonic; a later token supersedes every earlier one.
    pub token: u64,
    pub attempt_id: String,
    pub session_len: usize,
    pub reference_end: usize,
    pub comparisons: Vec<AxisComparison>,
}

#[derive(Debug, Clone)]
pub struct WindowOutcome {
    pub token: u64,
    pub attempt_id: String,
    pub findings: Vec<Finding>,
    pub failures: usize,
}

/// True when `len` completes a window.
pub fn completes_window(len: usize, window_size: usize) -> bool {
    window_size > 0 && len > 0 && len % window_size == 0
}

pub struct ComparisonScheduler {
    scoring: Arc<dyn ScoringService>,
    exercise_id: String,
    window_size: usize,
    cost_threshold: f64,
    joints: Vec<JointName>,
    timeout: Duration,
}

impl ComparisonScheduler {
    pub fn new(
        scoring: Arc<dyn ScoringService>,
        exercise_id: impl Into<String>,
        settings: &SessionSettings,
    ) -> Self {
        Self {
            scoring,
            exercise_id: exercise_id.into(),
            window_size: settings.window_size,
            cost_threshold: settings.cost_threshold,
            joints: settings.compared_joints(),
            timeout: settings.scoring_timeout(),
        }
    }

    pub fn should_trigger(&self, session_len: usize) -> bool {
        completes_window(session_len, self.window_size)
    }

    /// Snapshot the session so far against the reference prefix of the same length.
    pub fn build_window(
        &self,
        token: u64,
        attempt_id: &str,
        series: &SessionSeries,
        reference: &ReferenceSeries,
    ) -> ComparisonWindow {
        let session_len = series.len();
        let current = series.slice_from(0, session_len);
        let reference_frames = reference.prefix(session_len);

        let comparisons = self
            .joints
            .iter()
            .flat_map(|&joint| {
                Axis::BOTH.into_iter().map(move |axis| AxisComparison {
                    joint,
                    axis,
                    current: axis_values(current, joint, axis),
                    reference: axis_values(reference_frames, joint, axis),
                })
            })
            .collect();

        ComparisonWindow {
            token,
            attempt_id: attempt_id.to_string(),
            session_len,
            reference_end: reference_frames.len(),
            comparisons,
        }
    }

    /// Send every pair concurrently. Failed or timed-out pairs contribute nothing.
    pub async fn evaluate(&self, window: ComparisonWindow) -> WindowOutcome {
        log_info!(
            "window {} at {} frames: scoring {} pairs against reference [0, {})",
            window.token,
            window.session_len,
            window.comparisons.len(),
            window.reference_end
        );

        let mut tasks = JoinSet::new();
        for comparison in window.comparisons {
            let scoring = self.scoring.clone();
            let exercise_id = self.exercise_id.clone();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let request = scoring.dissimilarity(
                    &exercise_id,
                    &comparison.reference,
                    &comparison.current,
                );
                let result = match tokio::time::timeout(timeout, request).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("timed out after {timeout:?}")),
                };
                (comparison.joint, comparison.axis, result)
            });
        }

        let mut findings = Vec::new();
        let mut failures = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((joint, axis, Ok(cost))) => {
                    if cost > self.cost_threshold {
                        findings.push(Finding { joint, axis, cost });
                    }
                }
                Ok((joint, axis, Err(err))) => {
                    failures += 1;
                    log_warn!(
                        "window {}: scoring {}_{} failed: {err:#}",
                        window.token,
                        joint,
                        axis.suffix()
                    );
                }
                Err(err) => {
                    failures += 1;
                    log_warn!("window {}: scoring task failed: {err}", window.token);
                }
            }
        }
        findings.sort_by_key(|finding| (finding.joint, finding.axis));

        WindowOutcome {
            token: window.token,
            attempt_id: window.attempt_id,
            findings,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frame, JointSample};
    use crate::testing::StubScoring;

    /// Every joint holds `x = 10 * index`, `y = 10 * index + 1`, so a scored
    /// series identifies its own joint/axis.
    fn series(len: usize) -> SessionSeries {
        let mut joints = [JointSample::missing(); JointName::COUNT];
        for joint in JointName::ALL {
            let base = joint.index() as f64 * 10.0;
            joints[joint.index()] = JointSample::new(base, base + 1.0, 1.0);
        }

        let mut series = SessionSeries::new();
        for i in 0..len {
            series.append(Frame::new(i as u64, joints));
        }
        series
    }

    fn reference(len: usize) -> ReferenceSeries {
        ReferenceSeries::new(series(len).frames().to_vec())
    }

    fn key(joint: JointName, axis: Axis) -> f64 {
        joint.index() as f64 * 10.0 + if axis == Axis::Y { 1.0 } else { 0.0 }
    }

    fn scheduler(scoring: Arc<StubScoring>) -> ComparisonScheduler {
        ComparisonScheduler::new(scoring, "Es1", &SessionSettings::default())
    }

    #[test]
    fn test_triggers_only_on_multiples_of_window() {
        let triggers: Vec<usize> = (0..=95).filter(|&len| completes_window(len, 30)).collect();
        assert_eq!(triggers, vec![30, 60, 90]);
        assert!(!completes_window(30, 0));
    }

    #[test]
    fn test_window_covers_whole_session_and_matching_reference() {
        let scheduler = scheduler(Arc::new(StubScoring::with_cost(0.0)));
        let window = scheduler.build_window(1, "a", &series(60), &reference(200));

        assert_eq!(window.session_len, 60);
        assert_eq!(window.reference_end, 60);
        assert_eq!(window.comparisons.len(), 16);
        assert!(window
            .comparisons
            .iter()
            .all(|c| c.current.len() == 60 && c.reference.len() == 60));

        let first = &window.comparisons[0];
        assert_eq!((first.joint, first.axis), (JointName::LeftShoulder, Axis::X));
        let last = &window.comparisons[15];
        assert_eq!((last.joint, last.axis), (JointName::RightHip, Axis::Y));
    }

    #[test]
    fn test_short_reference_is_clamped() {
        let scheduler = scheduler(Arc::new(StubScoring::with_cost(0.0)));
        let window = scheduler.build_window(1, "a", &series(90), &reference(45));
        assert_eq!(window.reference_end, 45);
        assert_eq!(window.comparisons[0].reference.len(), 45);
        assert_eq!(window.comparisons[0].current.len(), 90);
    }

    #[tokio::test]
    async fn test_costs_above_threshold_become_findings_in_order() {
        let scoring = Arc::new(StubScoring::with_cost_fn(|_, current| {
            let first = current.first().copied().unwrap_or_default();
            if first == key(JointName::RightHip, Axis::X) {
                2.6
            } else if first == key(JointName::LeftElbow, Axis::Y) {
                9.0
            } else if first == key(JointName::LeftElbow, Axis::X) {
                2.5
            } else {
                0.0
            }
        }));

        let scheduler = scheduler(scoring.clone());
        let window = scheduler.build_window(4, "a", &series(30), &reference(30));
        let outcome = scheduler.evaluate(window).await;

        let found: Vec<(JointName, Axis)> =
            outcome.findings.iter().map(|f| (f.joint, f.axis)).collect();
        assert_eq!(
            found,
            vec![(JointName::LeftElbow, Axis::Y), (JointName::RightHip, Axis::X)]
        );
        assert_eq!(outcome.token, 4);
        assert_eq!(outcome.failures, 0);
        assert_eq!(scoring.feedback_calls(), 16);
    }

    #[tokio::test]
    async fn test_face_and_leg_joints_are_never_sent() {
        let scoring = Arc::new(StubScoring::with_cost(0.0));
        let scheduler = scheduler(scoring.clone());
        let window = scheduler.build_window(1, "a", &series(30), &reference(30));
        scheduler.evaluate(window).await;

        let sent: Vec<f64> = scoring
            .feedback_requests()
            .iter()
            .map(|request| request.current[0])
            .collect();
        for joint in [JointName::Nose, JointName::RightEar, JointName::LeftKnee, JointName::RightAnkle] {
            assert!(!sent.contains(&key(joint, Axis::X)));
        }
        assert!(sent.contains(&key(JointName::LeftShoulder, Axis::X)));
    }

    #[tokio::test]
    async fn test_scoring_failures_yield_no_findings() {
        let scoring = Arc::new(StubScoring::failing());
        let scheduler = scheduler(scoring);
        let window = scheduler.build_window(1, "a", &series(30), &reference(30));
        let outcome = scheduler.evaluate(window).await;
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.failures, 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_scoring_times_out() {
        let scoring = Arc::new(StubScoring::with_cost(10.0).with_delay(Duration::from_secs(60)));
        let scheduler = scheduler(scoring);
        let window = scheduler.build_window(1, "a", &series(30), &reference(30));
        let outcome = scheduler.evaluate(window).await;
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.failures, 16);
    }
}
