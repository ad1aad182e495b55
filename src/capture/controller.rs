use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::SessionError;

use super::device::{CanvasRenderer, CaptureDevice, FrameSink, PoseEstimator};
use super::sampler::{sampling_loop, SamplerConfig};

/// Owns the camera sampling task for the lifetime of the exercise screen.
pub struct CaptureController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl CaptureController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    /// Open the camera at `width`x`height` and start sampling into `sink`.
    /// Fails with [`SessionError::CaptureUnavailable`] if the camera cannot be opened.
    pub async fn start_capture(
        &mut self,
        device: Arc<dyn CaptureDevice>,
        estimator: Arc<dyn PoseEstimator>,
        renderer: Arc<dyn CanvasRenderer>,
        sink: Arc<dyn FrameSink>,
        config: SamplerConfig,
        (width, height): (u32, u32),
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("capture already active");
        }

        if let Err(err) = device.open(width, height).await {
            return Err(SessionError::CaptureUnavailable(format!("{err:#}")).into());
        }
        info!("capture opened at {width}x{height}, sampling every {:?}", config.interval);

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sampling_loop(
            device,
            estimator,
            renderer,
            sink,
            config,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub fn is_live(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub async fn stop_capture(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sampling task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for CaptureController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::{HeadlessCanvas, PoseCandidate, VideoFrame};
    use crate::models::Frame;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::time::Duration;

    struct NoCamera;

    #[async_trait]
    impl CaptureDevice for NoCamera {
        async fn open(&self, _width: u32, _height: u32) -> Result<()> {
            Err(anyhow!("permission denied"))
        }

        async fn grab(&self) -> Result<Option<VideoFrame>> {
            Ok(None)
        }
    }

    struct IdleCamera;

    #[async_trait]
    impl CaptureDevice for IdleCamera {
        async fn open(&self, _width: u32, _height: u32) -> Result<()> {
            Ok(())
        }

        async fn grab(&self) -> Result<Option<VideoFrame>> {
            Ok(None)
        }
    }

    struct NoPoses;

    #[async_trait]
    impl PoseEstimator for NoPoses {
        async fn estimate(&self, _frame: &VideoFrame) -> Result<Vec<PoseCandidate>> {
            Ok(Vec::new())
        }
    }

    struct Discard;

    #[async_trait]
    impl FrameSink for Discard {
        async fn submit(&self, _frame: Frame) {}
    }

    fn config() -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(33),
            min_pose_confidence: 0.1,
            trace_frames: false,
        }
    }

    #[tokio::test]
    async fn test_open_failure_is_capture_unavailable() {
        let mut controller = CaptureController::new();
        let err = controller
            .start_capture(
                Arc::new(NoCamera),
                Arc::new(NoPoses),
                Arc::new(HeadlessCanvas::default()),
                Arc::new(Discard),
                config(),
                (640, 480),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::CaptureUnavailable(reason)) if reason.contains("permission denied")
        ));
        assert!(!controller.is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_stop() {
        let mut controller = CaptureController::new();
        let start = || {
            (
                Arc::new(IdleCamera) as Arc<dyn CaptureDevice>,
                Arc::new(NoPoses) as Arc<dyn PoseEstimator>,
                Arc::new(HeadlessCanvas::default()) as Arc<dyn CanvasRenderer>,
                Arc::new(Discard) as Arc<dyn FrameSink>,
            )
        };

        let (device, estimator, renderer, sink) = start();
        controller
            .start_capture(device, estimator, renderer, sink, config(), (640, 480))
            .await
            .unwrap();
        assert!(controller.is_live());

        let (device, estimator, renderer, sink) = start();
        assert!(controller
            .start_capture(device, estimator, renderer, sink, config(), (640, 480))
            .await
            .is_err());

        controller.stop_capture().await.unwrap();
        assert!(!controller.is_live());
    }
}
