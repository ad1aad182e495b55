use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

use super::track::{parse_reference_table, ReferenceSeries};

/// What the exercise catalogue hands over for one exercise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseDescriptor {
    pub exercise_id: String,
    pub video_url: String,
    /// URL or filesystem path of the reference joint table.
    pub track_source: String,
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Fetch the raw table text from a URL or a local path.
pub async fn fetch_track_text(source: &str) -> Result<String> {
    if is_remote(source) {
        let response = reqwest::get(source)
            .await
            .with_context(|| format!("failed to request reference track {source}"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("reference track {source} returned {status}");
        }
        response
            .text()
            .await
            .with_context(|| format!("failed to read reference track body from {source}"))
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("failed to read reference track {source}"))
    }
}

/// Load and normalize the reference track. All failures surface as `ReferenceLoad`.
pub async fn load_reference_track(source: &str) -> Result<ReferenceSeries> {
    let text = fetch_track_text(source)
        .await
        .map_err(|err| SessionError::ReferenceLoad(format!("{err:#}")))?;
    parse_reference_table(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JointName;

    #[tokio::test]
    async fn test_load_from_file_swaps_labels() {
        let path = std::env::temp_dir().join(format!("reference-{}.csv", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "left_elbow_x,left_elbow_y\n0.3,0.4\n0.31,0.41\n")
            .await
            .unwrap();

        let reference = load_reference_track(path.to_str().unwrap()).await.unwrap();
        assert_eq!(reference.len(), 2);
        assert_eq!(reference.frames()[1].joint(JointName::RightElbow).y, 0.41);

        let _ = tokio::fs::remove_file(path).await;
    }

    #[tokio::test]
    async fn test_missing_file_is_reference_load_error() {
        let err = load_reference_track("/nonexistent/reference.csv")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::ReferenceLoad(_))
        ));
    }

    #[test]
    fn test_remote_detection() {
        assert!(is_remote("https://cdn.example.org/Es1.csv"));
        assert!(!is_remote("assets/Es1.csv"));
    }
}
