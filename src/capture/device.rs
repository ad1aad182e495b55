use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Frame, JointSample};

/// One picture from the live capture.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

/// One person hypothesis from the estimator, keypoints in pixel space and index order.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseCandidate {
    pub keypoints: Vec<JointSample>,
    pub score: Option<f64>,
}

impl PoseCandidate {
    /// Pose score if the estimator gave one, else mean keypoint confidence.
    pub fn confidence(&self) -> f64 {
        if let Some(score) = self.score {
            return score;
        }
        let finite: Vec<f64> = self
            .keypoints
            .iter()
            .map(|keypoint| keypoint.confidence)
            .filter(|confidence| confidence.is_finite())
            .collect();
        if finite.is_empty() {
            0.0
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        }
    }
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire the camera. Failure here means capture is unavailable.
    async fn open(&self, width: u32, height: u32) -> Result<()>;

    /// Latest frame, or `None` if nothing new is available this tick.
    async fn grab(&self) -> Result<Option<VideoFrame>>;
}

#[async_trait]
pub trait PoseEstimator: Send + Sync {
    async fn estimate(&self, frame: &VideoFrame) -> Result<Vec<PoseCandidate>>;
}

/// Draws the mirrored live feed with the skeleton overlay.
pub trait CanvasRenderer: Send + Sync {
    fn draw(&self, frame: &VideoFrame, pose: Option<&PoseCandidate>);
}

/// Receives every usable sampled frame, recording or not.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn submit(&self, frame: Frame);
}

/// Renderer for headless runs; keeps a draw count.
#[derive(Default)]
pub struct HeadlessCanvas {
    draws: AtomicU64,
}

impl HeadlessCanvas {
    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Relaxed)
    }
}

impl CanvasRenderer for HeadlessCanvas {
    fn draw(&self, frame: &VideoFrame, pose: Option<&PoseCandidate>) {
        self.draws.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "draw frame {} ({}x{}) skeleton={}",
            frame.sequence,
            frame.width,
            frame.height,
            pose.is_some()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_prefers_pose_score() {
        let pose = PoseCandidate {
            keypoints: vec![JointSample::new(0.0, 0.0, 0.2); 17],
            score: Some(0.9),
        };
        assert_eq!(pose.confidence(), 0.9);
    }

    #[test]
    fn test_confidence_falls_back_to_keypoint_mean() {
        let mut keypoints = vec![JointSample::new(0.0, 0.0, 0.5); 16];
        keypoints.push(JointSample::missing());
        let pose = PoseCandidate {
            keypoints,
            score: None,
        };
        assert!((pose.confidence() - 0.5).abs() < 1e-9);
    }
}
