use serde::{Deserialize, Serialize};

use super::joint::{Axis, JointName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackMessage {
    pub text: String,
    /// Display number; strictly increasing for the lifetime of the aggregator.
    pub ordinal: u64,
}

impl FeedbackMessage {
    pub fn correction(joint: JointName, axis: Axis, ordinal: u64) -> Self {
        Self {
            text: format!("Adjust your {} {}", joint.display_name(), axis.direction()),
            ordinal,
        }
    }
}
