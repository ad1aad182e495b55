use std::{sync::Arc, time::Duration};

use anyhow::Result;
use serde::Serialize;

use crate::error::SessionError;
use crate::settings::SessionSettings;

use super::ScoringService;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// How a resolved clinical score should be presented. The score itself is never altered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoreVerdict {
    WithinRange,
    TooManyMistakes,
}

impl ScoreVerdict {
    pub fn classify(score: f64, min: f64, max: f64) -> Self {
        if (min..=max).contains(&score) {
            ScoreVerdict::WithinRange
        } else {
            ScoreVerdict::TooManyMistakes
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoreSource {
    Remote,
    /// Feedback volume exceeded the cap; the remote model was not consulted.
    FeedbackCeiling,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalScore {
    pub value: f64,
    pub source: ScoreSource,
    pub verdict: ScoreVerdict,
}

pub struct ClinicalScoreFinalizer {
    scoring: Arc<dyn ScoringService>,
    feedback_cap: usize,
    ceiling_score: f64,
    display_range: (f64, f64),
    timeout: Duration,
}

impl ClinicalScoreFinalizer {
    pub fn new(scoring: Arc<dyn ScoringService>, settings: &SessionSettings) -> Self {
        Self {
            scoring,
            feedback_cap: settings.feedback_cap,
            ceiling_score: settings.ceiling_score,
            display_range: (settings.score_display_min, settings.score_display_max),
            timeout: settings.scoring_timeout(),
        }
    }

    /// Score a finished attempt. Raw remote scores pass through unclamped.
    pub async fn finalize(
        &self,
        exercise_id: &str,
        session_csv: &str,
        feedback_count: usize,
    ) -> Result<ClinicalScore> {
        if feedback_count > self.feedback_cap {
            log_info!(
                "{} corrections exceed cap of {}; scoring {} without remote call",
                feedback_count,
                self.feedback_cap,
                self.ceiling_score
            );
            return Ok(self.wrap(self.ceiling_score, ScoreSource::FeedbackCeiling));
        }

        let value = match tokio::time::timeout(
            self.timeout,
            self.scoring.clinical_score(exercise_id, session_csv),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                log_warn!(
                    "clinical scoring for {} timed out after {:?}",
                    exercise_id,
                    self.timeout
                );
                return Err(SessionError::ScoringService(format!(
                    "clinical score timed out after {:?}",
                    self.timeout
                ))
                .into());
            }
        };

        Ok(self.wrap(value, ScoreSource::Remote))
    }

    fn wrap(&self, value: f64, source: ScoreSource) -> ClinicalScore {
        let (min, max) = self.display_range;
        ClinicalScore {
            value,
            source,
            verdict: ScoreVerdict::classify(value, min, max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubScoring;

    fn finalizer(scoring: Arc<StubScoring>) -> ClinicalScoreFinalizer {
        ClinicalScoreFinalizer::new(scoring, &SessionSettings::default())
    }

    #[tokio::test]
    async fn test_feedback_over_cap_short_circuits() {
        let scoring = Arc::new(StubScoring::with_clinical(12.0));
        let score = finalizer(scoring.clone())
            .finalize("Es1", "csv", 76)
            .await
            .unwrap();

        assert_eq!(score.value, 100.0);
        assert_eq!(score.source, ScoreSource::FeedbackCeiling);
        assert_eq!(score.verdict, ScoreVerdict::TooManyMistakes);
        assert_eq!(scoring.clinical_calls(), 0);
    }

    #[tokio::test]
    async fn test_feedback_at_cap_still_calls_remote() {
        let scoring = Arc::new(StubScoring::with_clinical(12.0));
        let score = finalizer(scoring.clone())
            .finalize("Es1", "csv", 75)
            .await
            .unwrap();

        assert_eq!(score.value, 12.0);
        assert_eq!(score.source, ScoreSource::Remote);
        assert_eq!(score.verdict, ScoreVerdict::WithinRange);
        assert_eq!(scoring.clinical_calls(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_scores_pass_through() {
        for raw in [-7.25, 63.5] {
            let scoring = Arc::new(StubScoring::with_clinical(raw));
            let score = finalizer(scoring).finalize("Es2", "csv", 0).await.unwrap();
            assert_eq!(score.value, raw);
            assert_eq!(score.verdict, ScoreVerdict::TooManyMistakes);
        }
    }

    #[tokio::test]
    async fn test_remote_failure_is_error() {
        let scoring = Arc::new(StubScoring::failing());
        let err = finalizer(scoring).finalize("Es1", "csv", 0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::ScoringService(_))
        ));
    }

    #[test]
    fn test_verdict_bounds_inclusive() {
        assert_eq!(ScoreVerdict::classify(0.0, 0.0, 50.0), ScoreVerdict::WithinRange);
        assert_eq!(ScoreVerdict::classify(50.0, 0.0, 50.0), ScoreVerdict::WithinRange);
        assert_eq!(ScoreVerdict::classify(50.01, 0.0, 50.0), ScoreVerdict::TooManyMistakes);
    }
}
