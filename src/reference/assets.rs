use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::sync::watch;

use crate::events::{emit_json, EventSink, REFERENCE_READINESS_CHANGED};

use super::loader::{load_reference_track, ExerciseDescriptor};
use super::player::ReferencePlayer;
use super::track::ReferenceSeries;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "detail")]
pub enum AssetStatus {
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ReferenceReadiness {
    pub video: AssetStatus,
    pub track: AssetStatus,
    pub series: Option<ReferenceSeries>,
}

impl ReferenceReadiness {
    fn loading() -> Self {
        Self {
            video: AssetStatus::Loading,
            track: AssetStatus::Loading,
            series: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.video == AssetStatus::Ready && self.track == AssetStatus::Ready && self.series.is_some()
    }

    pub fn is_settled(&self) -> bool {
        self.video != AssetStatus::Loading && self.track != AssetStatus::Loading
    }

    pub fn failure(&self) -> Option<String> {
        [("video", &self.video), ("track", &self.track)]
            .into_iter()
            .find_map(|(what, status)| match status {
                AssetStatus::Failed(reason) => Some(format!("{what}: {reason}")),
                _ => None,
            })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadinessEvent<'a> {
    exercise_id: &'a str,
    video: &'a AssetStatus,
    track: &'a AssetStatus,
    track_frames: usize,
}

/// Reference video and joint track for one exercise. The two load concurrently and
/// report readiness independently.
#[derive(Clone)]
pub struct ReferenceAssets {
    descriptor: Arc<ExerciseDescriptor>,
    player: Arc<dyn ReferencePlayer>,
    events: Arc<dyn EventSink>,
    tx: Arc<watch::Sender<ReferenceReadiness>>,
}

impl ReferenceAssets {
    pub fn new(
        descriptor: ExerciseDescriptor,
        player: Arc<dyn ReferencePlayer>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let (tx, _) = watch::channel(ReferenceReadiness::loading());
        Self {
            descriptor: Arc::new(descriptor),
            player,
            events,
            tx: Arc::new(tx),
        }
    }

    pub fn descriptor(&self) -> &ExerciseDescriptor {
        &self.descriptor
    }

    pub fn player(&self) -> Arc<dyn ReferencePlayer> {
        self.player.clone()
    }

    pub fn current(&self) -> ReferenceReadiness {
        self.tx.borrow().clone()
    }

    /// Start both loads. Returns immediately.
    pub fn load(&self) {
        self.spawn_video_load();
        self.spawn_track_load();
    }

    /// Reload whatever failed; assets already loaded are kept.
    pub fn retry(&self) {
        let current = self.current();
        if matches!(current.video, AssetStatus::Failed(_)) {
            self.spawn_video_load();
        }
        if matches!(current.track, AssetStatus::Failed(_)) {
            self.spawn_track_load();
        }
    }

    /// Resolves once neither asset is still loading.
    pub async fn wait_until_settled(&self) -> Result<ReferenceReadiness> {
        let mut rx = self.tx.subscribe();
        let settled = rx
            .wait_for(ReferenceReadiness::is_settled)
            .await
            .map_err(|_| anyhow!("reference readiness channel closed"))?;
        Ok(settled.clone())
    }

    fn spawn_video_load(&self) {
        self.update(|readiness| readiness.video = AssetStatus::Loading);
        let this = self.clone();
        tokio::spawn(async move {
            let url = this.descriptor.video_url.clone();
            let status = match this.player.load(&url).await {
                Ok(()) => {
                    log_info!("reference video ready: {}", url);
                    AssetStatus::Ready
                }
                Err(err) => {
                    log_error!("reference video {} failed to load: {err:#}", url);
                    AssetStatus::Failed(format!("{err:#}"))
                }
            };
            this.update(|readiness| readiness.video = status);
        });
    }

    fn spawn_track_load(&self) {
        self.update(|readiness| {
            readiness.track = AssetStatus::Loading;
            readiness.series = None;
        });
        let this = self.clone();
        tokio::spawn(async move {
            let source = this.descriptor.track_source.clone();
            match load_reference_track(&source).await {
                Ok(series) => {
                    log_info!("reference track ready: {} frames from {}", series.len(), source);
                    this.update(|readiness| {
                        readiness.track = AssetStatus::Ready;
                        readiness.series = Some(series);
                    });
                }
                Err(err) => {
                    log_error!("reference track {} failed to load: {err:#}", source);
                    this.update(|readiness| readiness.track = AssetStatus::Failed(format!("{err:#}")));
                }
            }
        });
    }

    fn update(&self, modify: impl FnOnce(&mut ReferenceReadiness)) {
        self.tx.send_modify(modify);
        let readiness = self.tx.borrow().clone();
        emit_json(
            self.events.as_ref(),
            REFERENCE_READINESS_CHANGED,
            &ReadinessEvent {
                exercise_id: &self.descriptor.exercise_id,
                video: &readiness.video,
                track: &readiness.track,
                track_frames: readiness.series.as_ref().map_or(0, ReferenceSeries::len),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogEvents;
    use crate::reference::player::HeadlessPlayer;
    use crate::testing::{RecordingEvents, StubPlayer};

    fn assets(track_source: String) -> ReferenceAssets {
        ReferenceAssets::new(
            ExerciseDescriptor {
                exercise_id: "Es1".into(),
                video_url: "file:///videos/Es1.mp4".into(),
                track_source,
            },
            Arc::new(HeadlessPlayer::new()),
            Arc::new(LogEvents),
        )
    }

    #[tokio::test]
    async fn test_loads_video_and_track() {
        let path = std::env::temp_dir().join(format!("assets-{}.csv", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "left_hip_x,left_hip_y\n0.5,0.6\n").await.unwrap();

        let assets = assets(path.to_string_lossy().into_owned());
        assert!(!assets.current().is_ready());
        assets.load();

        let readiness = assets.wait_until_settled().await.unwrap();
        assert!(readiness.is_ready());
        assert_eq!(readiness.series.map(|s| s.len()), Some(1));

        let _ = tokio::fs::remove_file(path).await;
    }

    #[tokio::test]
    async fn test_track_failure_then_retry() {
        let path = std::env::temp_dir().join(format!("assets-{}.csv", uuid::Uuid::new_v4()));
        let assets = assets(path.to_string_lossy().into_owned());
        assets.load();

        let readiness = assets.wait_until_settled().await.unwrap();
        assert!(!readiness.is_ready());
        assert_eq!(readiness.video, AssetStatus::Ready);
        assert!(readiness.failure().unwrap().starts_with("track:"));

        tokio::fs::write(&path, "right_wrist_x\n0.2\n").await.unwrap();
        assets.retry();
        let readiness = assets.wait_until_settled().await.unwrap();
        assert!(readiness.is_ready());

        let _ = tokio::fs::remove_file(path).await;
    }

    #[tokio::test]
    async fn test_video_failure_reported_with_events() {
        let path = std::env::temp_dir().join(format!("assets-{}.csv", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "left_hip_x\n0.5\n").await.unwrap();

        let events = Arc::new(RecordingEvents::default());
        let player = StubPlayer::broken();
        let assets = ReferenceAssets::new(
            ExerciseDescriptor {
                exercise_id: "Es2".into(),
                video_url: "https://example.test/Es2.mp4".into(),
                track_source: path.to_string_lossy().into_owned(),
            },
            Arc::new(player),
            events.clone(),
        );
        assets.load();

        let readiness = assets.wait_until_settled().await.unwrap();
        assert_eq!(readiness.track, AssetStatus::Ready);
        assert!(readiness.failure().unwrap().starts_with("video:"));

        let last = events.named(REFERENCE_READINESS_CHANGED).pop().unwrap();
        assert_eq!(last["exerciseId"], "Es2");
        assert_eq!(last["video"]["state"], "failed");

        let _ = tokio::fs::remove_file(path).await;
    }
}
