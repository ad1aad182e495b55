use std::fmt::Write as _;

use crate::models::{Frame, JointName};

/// Append-only record of the frames sampled during one attempt.
#[derive(Debug, Clone, Default)]
pub struct SessionSeries {
    frames: Vec<Frame>,
}

impl SessionSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames in `[start, end)`; both bounds are clamped to the current length.
    pub fn slice_from(&self, start: usize, end_exclusive: usize) -> &[Frame] {
        let end = end_exclusive.min(self.frames.len());
        let start = start.min(end);
        &self.frames[start..end]
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Callers must not reset while the attempt is recording.
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Flat table submitted for clinical scoring: `<joint>_x,<joint>_y,<joint>_confidence`
    /// per joint in index order, one row per frame.
    pub fn to_csv(&self) -> String {
        let mut out = csv_header();
        out.push('\n');
        for frame in &self.frames {
            let mut first = true;
            for joint in JointName::ALL {
                let sample = frame.joint(joint);
                for value in [sample.x, sample.y, sample.confidence] {
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    if value.is_finite() {
                        let _ = write!(out, "{value}");
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

fn csv_header() -> String {
    JointName::ALL
        .iter()
        .flat_map(|joint| {
            ["x", "y", "confidence"]
                .into_iter()
                .map(move |field| format!("{}_{}", joint.as_str(), field))
        })
        .collect::<Vec<_>>()
        .join(",")
}
