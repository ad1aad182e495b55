use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The 17 body keypoints reported by the pose estimator, in estimator index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum JointName {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl JointName {
    pub const COUNT: usize = 17;

    pub const ALL: [JointName; JointName::COUNT] = [
        JointName::Nose,
        JointName::LeftEye,
        JointName::RightEye,
        JointName::LeftEar,
        JointName::RightEar,
        JointName::LeftShoulder,
        JointName::RightShoulder,
        JointName::LeftElbow,
        JointName::RightElbow,
        JointName::LeftWrist,
        JointName::RightWrist,
        JointName::LeftHip,
        JointName::RightHip,
        JointName::LeftKnee,
        JointName::RightKnee,
        JointName::LeftAnkle,
        JointName::RightAnkle,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Column-style name, e.g. `left_shoulder`.
    pub fn as_str(self) -> &'static str {
        match self {
            JointName::Nose => "nose",
            JointName::LeftEye => "left_eye",
            JointName::RightEye => "right_eye",
            JointName::LeftEar => "left_ear",
            JointName::RightEar => "right_ear",
            JointName::LeftShoulder => "left_shoulder",
            JointName::RightShoulder => "right_shoulder",
            JointName::LeftElbow => "left_elbow",
            JointName::RightElbow => "right_elbow",
            JointName::LeftWrist => "left_wrist",
            JointName::RightWrist => "right_wrist",
            JointName::LeftHip => "left_hip",
            JointName::RightHip => "right_hip",
            JointName::LeftKnee => "left_knee",
            JointName::RightKnee => "right_knee",
            JointName::LeftAnkle => "left_ankle",
            JointName::RightAnkle => "right_ankle",
        }
    }

    /// Human-readable name with separators replaced by spaces.
    pub fn display_name(self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for JointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JointName {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|joint| joint.as_str() == value)
            .ok_or_else(|| anyhow::anyhow!("unknown joint '{value}'"))
    }
}

/// Coordinate axis of a joint sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub const BOTH: [Axis; 2] = [Axis::X, Axis::Y];

    pub fn suffix(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
        }
    }

    /// Direction word used in corrective feedback.
    pub fn direction(self) -> &'static str {
        match self {
            Axis::X => "horizontally",
            Axis::Y => "vertically",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointSample {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl JointSample {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }

    /// Placeholder for a joint absent from a source row.
    pub fn missing() -> Self {
        Self {
            x: f64::NAN,
            y: f64::NAN,
            confidence: f64::NAN,
        }
    }

    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }
}

impl Default for JointSample {
    fn default() -> Self {
        Self::missing()
    }
}

/// One sampled pose: every joint's measurement at a single display tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Milliseconds since capture started (live) or row index (reference).
    pub timestamp_ms: u64,
    pub joints: [JointSample; JointName::COUNT],
}

impl Frame {
    pub fn new(timestamp_ms: u64, joints: [JointSample; JointName::COUNT]) -> Self {
        Self {
            timestamp_ms,
            joints,
        }
    }

    pub fn empty(timestamp_ms: u64) -> Self {
        Self::new(timestamp_ms, [JointSample::missing(); JointName::COUNT])
    }

    pub fn joint(&self, joint: JointName) -> &JointSample {
        &self.joints[joint.index()]
    }

    pub fn joint_mut(&mut self, joint: JointName) -> &mut JointSample {
        &mut self.joints[joint.index()]
    }
}

/// Extract a single joint/axis column from a run of frames.
pub fn axis_values(frames: &[Frame], joint: JointName, axis: Axis) -> Vec<f64> {
    frames
        .iter()
        .map(|frame| frame.joint(joint).axis(axis))
        .collect()
}
