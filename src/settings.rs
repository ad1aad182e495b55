use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::models::JointName;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Frames per comparison window (~1s at 30fps).
    pub window_size: usize,
    /// Dissimilarity above this produces a correction.
    pub cost_threshold: f64,
    /// Inclusive index range of compared joints (shoulders through hips).
    pub first_compared_joint: usize,
    pub last_compared_joint: usize,

    pub countdown_ticks: i32,
    pub countdown_tick_ms: u64,
    pub recording_duration_secs: u64,

    /// More cumulative corrections than this short-circuits clinical scoring.
    pub feedback_cap: usize,
    pub ceiling_score: f64,
    pub score_display_min: f64,
    pub score_display_max: f64,

    pub frame_interval_ms: u64,
    pub capture_width: u32,
    pub capture_height: u32,
    pub min_pose_confidence: f64,

    pub scoring_base_url: String,
    pub scoring_timeout_secs: u64,

    #[serde(skip)]
    pub debug: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            window_size: 30,
            cost_threshold: 2.5,
            first_compared_joint: JointName::LeftShoulder.index(),
            last_compared_joint: JointName::RightHip.index(),
            countdown_ticks: 10,
            countdown_tick_ms: 1_000,
            recording_duration_secs: 30,
            feedback_cap: 75,
            ceiling_score: 100.0,
            score_display_min: 0.0,
            score_display_max: 50.0,
            frame_interval_ms: 33,
            capture_width: 640,
            capture_height: 480,
            min_pose_confidence: 0.1,
            scoring_base_url: "http://localhost:8000".into(),
            scoring_timeout_secs: 10,
            debug: false,
        }
    }
}

impl SessionSettings {
    pub fn compared_joints(&self) -> Vec<JointName> {
        JointName::ALL
            .iter()
            .copied()
            .filter(|joint| {
                (self.first_compared_joint..=self.last_compared_joint).contains(&joint.index())
            })
            .collect()
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms.max(1))
    }

    pub fn recording_duration(&self) -> Duration {
        Duration::from_secs(self.recording_duration_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_secs(self.scoring_timeout_secs)
    }

    /// Overlay environment switches on top of file values.
    fn apply_env(mut self) -> Self {
        self.debug = std::env::var("PHYSIO_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if let Ok(url) = std::env::var("PHYSIO_SCORING_URL") {
            if !url.trim().is_empty() {
                self.scoring_base_url = url.trim().to_string();
            }
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<SessionSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring malformed settings {}: {err}", path.display());
                SessionSettings::default()
            })
        } else {
            SessionSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn session(&self) -> SessionSettings {
        self.read().clone().apply_env()
    }

    pub fn update_session(&self, settings: SessionSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &SessionSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("physio-settings-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_defaults_match_exercise_protocol() {
        let settings = SessionSettings::default();
        assert_eq!(settings.window_size, 30);
        assert_eq!(settings.cost_threshold, 2.5);
        assert_eq!(settings.countdown_ticks, 10);
        assert_eq!(settings.recording_duration_secs, 30);
        assert_eq!(settings.feedback_cap, 75);
        assert_eq!(settings.ceiling_score, 100.0);
    }

    #[test]
    fn test_compared_joints_are_shoulders_through_hips() {
        let joints = SessionSettings::default().compared_joints();
        assert_eq!(joints.len(), 8);
        assert_eq!(joints.first(), Some(&JointName::LeftShoulder));
        assert_eq!(joints.last(), Some(&JointName::RightHip));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let store = SettingsStore::new(temp_path()).unwrap();
        assert_eq!(store.read().window_size, 30);
    }

    #[test]
    fn test_update_persists_and_reloads() {
        let path = temp_path();
        let store = SettingsStore::new(path.clone()).unwrap();
        let mut settings = SessionSettings::default();
        settings.cost_threshold = 3.0;
        settings.window_size = 15;
        store.update_session(settings).unwrap();

        let reloaded = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reloaded.read().cost_threshold, 3.0);
        assert_eq!(reloaded.read().window_size, 15);
        assert_eq!(reloaded.read().feedback_cap, 75);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let path = temp_path();
        fs::write(&path, "{ not json").unwrap();
        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.read().window_size, 30);
        let _ = fs::remove_file(path);
    }
}
