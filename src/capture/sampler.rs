use std::sync::Arc;

use anyhow::Result;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;
use crate::models::{Frame, JointName, JointSample};
use crate::settings::SessionSettings;

use super::device::{CanvasRenderer, CaptureDevice, FrameSink, PoseCandidate, PoseEstimator, VideoFrame};

// Set to false to silence per-frame logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_trace, log_warn};

#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    pub interval: Duration,
    pub min_pose_confidence: f64,
    pub trace_frames: bool,
}

impl SamplerConfig {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            interval: settings.frame_interval(),
            min_pose_confidence: settings.min_pose_confidence,
            trace_frames: settings.debug,
        }
    }
}

/// Highest-confidence candidate; the earliest wins a tie.
pub fn select_pose(candidates: &[PoseCandidate]) -> Option<&PoseCandidate> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(current) if current.confidence() >= candidate.confidence() => Some(current),
        _ => Some(candidate),
    })
}

/// Convert a pixel-space pose into a frame with coordinates normalised to `[0, 1]`.
pub fn to_frame(pose: &PoseCandidate, width: u32, height: u32, timestamp_ms: u64) -> Result<Frame> {
    if width == 0 || height == 0 {
        return Err(SessionError::MalformedFrame(format!("zero-sized frame {width}x{height}")).into());
    }
    if pose.keypoints.len() < JointName::COUNT {
        return Err(SessionError::MalformedFrame(format!(
            "expected {} keypoints, got {}",
            JointName::COUNT,
            pose.keypoints.len()
        ))
        .into());
    }

    let (width, height) = (f64::from(width), f64::from(height));
    let mut frame = Frame::empty(timestamp_ms);
    for joint in JointName::ALL {
        let keypoint = pose.keypoints[joint.index()];
        *frame.joint_mut(joint) =
            JointSample::new(keypoint.x / width, keypoint.y / height, keypoint.confidence);
    }
    Ok(frame)
}

/// Runs once per display tick until cancelled: estimate, redraw, then forward the
/// frame to `sink`. The sink decides whether it is recorded.
pub async fn sampling_loop(
    device: Arc<dyn CaptureDevice>,
    estimator: Arc<dyn PoseEstimator>,
    renderer: Arc<dyn CanvasRenderer>,
    sink: Arc<dyn FrameSink>,
    config: SamplerConfig,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let timestamp_ms = started.elapsed().as_millis() as u64;
                match sample_once(
                    device.as_ref(),
                    estimator.as_ref(),
                    renderer.as_ref(),
                    &config,
                    timestamp_ms,
                )
                .await
                {
                    Ok(Some(frame)) => sink.submit(frame).await,
                    Ok(None) => {}
                    Err(err) => {
                        if matches!(err.downcast_ref::<SessionError>(), Some(SessionError::MalformedFrame(_))) {
                            if config.trace_frames {
                                log_trace!("skipping frame at {}ms: {err}", timestamp_ms);
                            }
                        } else {
                            log_warn!("pose sampling failed at {}ms: {err:#}", timestamp_ms);
                        }
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down");
                break;
            }
        }
    }
}

async fn sample_once(
    device: &dyn CaptureDevice,
    estimator: &dyn PoseEstimator,
    renderer: &dyn CanvasRenderer,
    config: &SamplerConfig,
    timestamp_ms: u64,
) -> Result<Option<Frame>> {
    let Some(video_frame) = device.grab().await? else {
        return Ok(None);
    };

    let candidates = estimator.estimate(&video_frame).await?;
    let pose = select_pose(&candidates);
    renderer.draw(&video_frame, pose);

    let Some(pose) = pose else {
        return Ok(None);
    };
    if pose.confidence() < config.min_pose_confidence {
        return Err(SessionError::MalformedFrame(format!(
            "pose confidence {:.3} below {:.3}",
            pose.confidence(),
            config.min_pose_confidence
        ))
        .into());
    }

    let frame = to_frame(pose, video_frame.width, video_frame.height, timestamp_ms)?;
    if config.trace_frames {
        log_trace!("sampled frame {} at {}ms", video_frame.sequence, timestamp_ms);
    }
    Ok(Some(frame))
}

/// Frame used by tests and replay: `sequence` with an empty pixel buffer.
pub fn blank_video_frame(sequence: u64, width: u32, height: u32) -> VideoFrame {
    VideoFrame {
        sequence,
        width,
        height,
        pixels: Arc::from(Vec::new()),
    }
}
