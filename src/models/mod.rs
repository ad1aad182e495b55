pub mod feedback;
pub mod joint;

pub use feedback::FeedbackMessage;
pub use joint::{axis_values, Axis, Frame, JointName, JointSample};
