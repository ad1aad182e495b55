use std::sync::Arc;

use anyhow::Result;

use crate::error::SessionError;
use crate::models::{Frame, JointName};

const LEFT_PREFIX: &str = "left_";
const RIGHT_PREFIX: &str = "right_";

/// Reference motion for one exercise. Immutable once parsed; clones share frames.
#[derive(Debug, Clone)]
pub struct ReferenceSeries {
    frames: Arc<[Frame]>,
}

impl ReferenceSeries {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Frames `[0, end)`, clamped to the reference length.
    pub fn prefix(&self, end_exclusive: usize) -> &[Frame] {
        &self.frames[..end_exclusive.min(self.frames.len())]
    }
}

/// How header labels are interpreted when a table is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideLabels {
    /// Labels are taken as written.
    AsRecorded,
    /// The source recording is mirrored; swap every left/right prefix once.
    Mirrored,
}

/// Swap a leading `left_`/`right_` for its opposite. Applying it twice returns the input.
pub fn swap_side_prefix(label: &str) -> String {
    if let Some(rest) = label.strip_prefix(LEFT_PREFIX) {
        format!("{RIGHT_PREFIX}{rest}")
    } else if let Some(rest) = label.strip_prefix(RIGHT_PREFIX) {
        format!("{LEFT_PREFIX}{rest}")
    } else {
        label.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    X,
    Y,
    Confidence,
}

/// Map `left_shoulder_x` style labels onto a joint and field.
fn parse_column(label: &str) -> Option<(JointName, Field)> {
    let (joint, field) = label.rsplit_once('_')?;
    let field = match field {
        "x" => Field::X,
        "y" => Field::Y,
        "confidence" | "score" => Field::Confidence,
        _ => return None,
    };
    Some((joint.parse().ok()?, field))
}

/// Parse a comma-separated joint table. First line is the header; blank rows are
/// skipped; values that are not numbers become NaN; unknown columns are ignored.
pub fn parse_joint_table(text: &str, labels: SideLabels) -> Result<Vec<Frame>> {
    let mut lines = text.lines();
    let header = lines
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or_else(|| SessionError::ReferenceLoad("joint table is empty".into()))?;

    let columns: Vec<Option<(JointName, Field)>> = header
        .split(',')
        .map(|label| {
            let label = label.trim();
            let label = match labels {
                SideLabels::AsRecorded => label.to_string(),
                SideLabels::Mirrored => swap_side_prefix(label),
            };
            parse_column(&label)
        })
        .collect();

    if columns.iter().all(Option::is_none) {
        return Err(SessionError::ReferenceLoad(format!(
            "no joint columns in header '{}'",
            header.trim()
        ))
        .into());
    }

    let mut frames = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }

        let mut frame = Frame::empty(frames.len() as u64);
        for (cell, column) in line.split(',').zip(columns.iter()) {
            let Some((joint, field)) = column else {
                continue;
            };
            let value = cell.trim().parse::<f64>().unwrap_or(f64::NAN);
            let sample = frame.joint_mut(*joint);
            match field {
                Field::X => sample.x = value,
                Field::Y => sample.y = value,
                Field::Confidence => sample.confidence = value,
            }
        }
        frames.push(frame);
    }

    Ok(frames)
}

/// Parse a reference recording, correcting its mirrored side labels.
pub fn parse_reference_table(text: &str) -> Result<ReferenceSeries> {
    let frames = parse_joint_table(text, SideLabels::Mirrored)?;
    if frames.is_empty() {
        return Err(SessionError::ReferenceLoad("reference track has no rows".into()).into());
    }
    Ok(ReferenceSeries::new(frames))
}
