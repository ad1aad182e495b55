use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::{Frame, JointName, JointSample};
use crate::reference::{parse_joint_table, SideLabels};

use super::device::{CaptureDevice, PoseCandidate, PoseEstimator, VideoFrame};
use super::sampler::blank_video_frame;

/// Plays a recorded session table back as if it came from the camera.
///
/// The recording is stored normalised; frames are scaled back to pixels so they go
/// through the same pose pipeline as live input. Nothing is served until
/// [`ReplayCapture::rewind`] is called, so the countdown does not consume rows.
pub struct ReplayCapture {
    frames: Vec<Frame>,
    width: u32,
    height: u32,
    cursor: AtomicUsize,
    sequence: AtomicU64,
}

impl ReplayCapture {
    pub fn new(frames: Vec<Frame>, width: u32, height: u32) -> Self {
        let len = frames.len();
        Self {
            frames,
            width,
            height,
            cursor: AtomicUsize::new(len),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn from_table(text: &str, width: u32, height: u32) -> Result<Self> {
        let frames = parse_joint_table(text, SideLabels::AsRecorded)?;
        Ok(Self::new(frames, width, height))
    }

    pub async fn from_path(path: &str, width: u32, height: u32) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read replay table {path}"))?;
        Self::from_table(&text, width, height)
            .with_context(|| format!("failed to parse replay table {path}"))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Serve the recording again from its first row.
    pub fn rewind(&self) {
        self.cursor.store(0, Ordering::SeqCst);
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor.load(Ordering::SeqCst) >= self.frames.len()
    }

    fn frame_at(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }
}

#[async_trait]
impl CaptureDevice for ReplayCapture {
    async fn open(&self, width: u32, height: u32) -> Result<()> {
        if (width, height) != (self.width, self.height) {
            log::warn!(
                "replay recorded for {}x{}, capture requested {width}x{height}",
                self.width,
                self.height
            );
        }
        Ok(())
    }

    async fn grab(&self) -> Result<Option<VideoFrame>> {
        let index = self.cursor.load(Ordering::SeqCst);
        if index >= self.frames.len() {
            return Ok(None);
        }
        self.cursor.store(index + 1, Ordering::SeqCst);
        // The row index rides in the pixel buffer so the estimator can find it.
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let mut frame = blank_video_frame(sequence, self.width, self.height);
        frame.pixels = index.to_le_bytes().to_vec().into();
        Ok(Some(frame))
    }
}

#[async_trait]
impl PoseEstimator for ReplayCapture {
    async fn estimate(&self, frame: &VideoFrame) -> Result<Vec<PoseCandidate>> {
        let Ok(bytes) = <[u8; std::mem::size_of::<usize>()]>::try_from(&frame.pixels[..]) else {
            return Ok(Vec::new());
        };
        let Some(recorded) = self.frame_at(usize::from_le_bytes(bytes)) else {
            return Ok(Vec::new());
        };

        let (width, height) = (f64::from(frame.width), f64::from(frame.height));
        let keypoints = JointName::ALL
            .iter()
            .map(|&joint| {
                let sample = recorded.joint(joint);
                JointSample::new(sample.x * width, sample.y * height, sample.confidence)
            })
            .collect();
        Ok(vec![PoseCandidate {
            keypoints,
            score: None,
        }])
    }
}
