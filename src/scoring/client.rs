use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::SessionError;

/// Remote service that computes alignment costs and clinical scores.
#[async_trait]
pub trait ScoringService: Send + Sync {
    /// Dissimilarity between one joint/axis series of the attempt and the reference.
    async fn dissimilarity(
        &self,
        exercise_id: &str,
        reference: &[f64],
        current: &[f64],
    ) -> Result<f64>;

    /// Clinical score for a finished attempt serialized as a flat CSV table.
    async fn clinical_score(&self, exercise_id: &str, session_csv: &str) -> Result<f64>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackRequest<'a> {
    reference_joint_values: &'a [f64],
    current_joint_values: &'a [f64],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClinicalScoreRequest<'a> {
    csv_string: &'a str,
}

pub struct HttpScoringService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpScoringService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build scoring HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| SessionError::ScoringService(format!("POST {url}: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::ScoringService(format!("POST {url} returned {status}")).into());
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| SessionError::ScoringService(format!("POST {url}: bad body: {err}")).into())
    }
}

#[async_trait]
impl ScoringService for HttpScoringService {
    async fn dissimilarity(
        &self,
        exercise_id: &str,
        reference: &[f64],
        current: &[f64],
    ) -> Result<f64> {
        let body = FeedbackRequest {
            reference_joint_values: reference,
            current_joint_values: current,
        };
        let value = self
            .post_json(&format!("/api/feedback/{exercise_id}"), &body)
            .await?;
        extract_dissimilarity(&value)
    }

    async fn clinical_score(&self, exercise_id: &str, session_csv: &str) -> Result<f64> {
        let body = ClinicalScoreRequest {
            csv_string: session_csv,
        };
        let value = self
            .post_json(&format!("/api/clinical_score/{exercise_id}"), &body)
            .await?;
        extract_clinical_score(&value)
    }
}

/// The cost sits at `feedback_dtw[0]`.
pub fn extract_dissimilarity(body: &Value) -> Result<f64> {
    body.get("feedback_dtw")
        .and_then(|costs| costs.get(0))
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            SessionError::ScoringService(format!("no feedback_dtw[0] in response: {body}")).into()
        })
}

/// The score sits at `clinical_score[0][0]`.
pub fn extract_clinical_score(body: &Value) -> Result<f64> {
    body.get("clinical_score")
        .and_then(|rows| rows.get(0))
        .and_then(|row| row.get(0))
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            SessionError::ScoringService(format!("no clinical_score[0][0] in response: {body}"))
                .into()
        })
}
