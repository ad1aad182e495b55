pub mod controller;
pub mod device;
pub mod replay;
pub mod sampler;

pub use controller::CaptureController;
pub use device::{CanvasRenderer, CaptureDevice, FrameSink, HeadlessCanvas, PoseCandidate, PoseEstimator, VideoFrame};
pub use replay::ReplayCapture;
pub use sampler::{sampling_loop, select_pose, to_frame, SamplerConfig};
