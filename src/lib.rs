pub mod capture;
pub mod comparison;
pub mod error;
pub mod events;
pub mod feedback;
pub mod models;
pub mod reference;
pub mod scoring;
pub mod session;
pub mod settings;
mod utils;

#[cfg(test)]
mod testing;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use tokio::sync::broadcast::{error::RecvError, Receiver};

use capture::{CaptureController, HeadlessCanvas, ReplayCapture};
use error::SessionError;
use events::{
    BroadcastEvents, EventSink, SessionEvent, CLINICAL_SCORE_FAILED, CLINICAL_SCORE_RESOLVED,
    SESSION_STATE_CHANGED,
};
use reference::{ExerciseDescriptor, HeadlessPlayer, ReferenceAssets};
use scoring::{HttpScoringService, ScoreVerdict};
use session::{display_secs, SessionController, SessionStatus};
use settings::{SessionSettings, SettingsStore};

/// Inputs for one headless attempt.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub exercise_id: String,
    pub video_url: String,
    pub reference_track: String,
    /// Recorded session table played back in place of the camera.
    pub replay: String,
    pub settings_path: PathBuf,
    pub scoring_url: Option<String>,
    /// Persist the effective settings back to `settings_path`.
    pub write_settings: bool,
}

/// Run a single attempt end to end and print the corrections and clinical score.
pub async fn run(options: RunOptions) -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("physio-coach starting up...");

    let store = SettingsStore::new(options.settings_path.clone())?;
    let mut settings = store.session();
    if let Some(url) = options.scoring_url {
        settings.scoring_base_url = url;
    }
    if options.write_settings {
        store.update_session(settings.clone())?;
        log::info!("settings written to {}", options.settings_path.display());
    }

    let broadcast = BroadcastEvents::new(256);
    let mut rx = broadcast.subscribe();
    let events: Arc<dyn EventSink> = Arc::new(broadcast);

    let scoring = Arc::new(HttpScoringService::new(
        settings.scoring_base_url.clone(),
        settings.scoring_timeout(),
    )?);

    let assets = ReferenceAssets::new(
        ExerciseDescriptor {
            exercise_id: options.exercise_id.clone(),
            video_url: options.video_url,
            track_source: options.reference_track,
        },
        Arc::new(HeadlessPlayer::new()),
        events.clone(),
    );
    assets.load();
    let readiness = assets.wait_until_settled().await?;
    if let Some(reason) = readiness.failure() {
        return Err(SessionError::ReferenceLoad(reason).into());
    }

    let session = SessionController::new(&settings, scoring, assets, events);

    let replay = Arc::new(
        ReplayCapture::from_path(&options.replay, settings.capture_width, settings.capture_height)
            .await?,
    );
    log::info!("replaying {} recorded frames from {}", replay.len(), options.replay);

    let mut capture = CaptureController::new();
    session
        .attach_capture(
            &mut capture,
            replay.clone(),
            replay.clone(),
            Arc::new(HeadlessCanvas::default()),
            &settings,
        )
        .await?;

    session.start().await?;
    let outcome = drive_attempt(&session, &replay, &mut rx).await;

    capture.stop_capture().await?;
    session.shutdown().await;
    outcome?;

    print_report(&session, &settings).await;
    Ok(())
}

/// Feed the replay once recording begins, stop when it runs out, and wait for scoring.
/// A failed clinical score is retried once.
async fn drive_attempt(
    session: &SessionController,
    replay: &ReplayCapture,
    rx: &mut Receiver<SessionEvent>,
) -> Result<()> {
    let mut poll = tokio::time::interval(Duration::from_millis(100));
    let mut replaying = false;
    let mut stop_requested = false;
    let mut retried = false;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => match event.name.as_str() {
                    SESSION_STATE_CHANGED => {
                        if !replaying && session.get_state().await.status == SessionStatus::Recording {
                            replay.rewind();
                            replaying = true;
                        }
                    }
                    CLINICAL_SCORE_RESOLVED => return Ok(()),
                    CLINICAL_SCORE_FAILED => {
                        let reason = event.payload["reason"].as_str().unwrap_or("unknown").to_string();
                        if retried {
                            return Err(SessionError::ScoringService(reason).into());
                        }
                        log::warn!("clinical scoring failed ({reason}); retrying once");
                        retried = true;
                        session.retry_clinical_score().await?;
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("event stream lagged; {skipped} events skipped");
                }
                Err(RecvError::Closed) => return Err(anyhow!("session event stream closed")),
            },
            _ = poll.tick() => {
                if replaying && !stop_requested && replay.is_exhausted() {
                    stop_requested = true;
                    if let Err(err) = session.stop().await {
                        log::info!("replay finished after attempt ended: {err}");
                    }
                }
            }
        }
    }
}

async fn print_report(session: &SessionController, settings: &SessionSettings) {
    let snapshot = session.snapshot().await;

    println!(
        "Exercise {} finished after {:.2}s ({} frames)",
        snapshot.state.exercise_id,
        display_secs(snapshot.state.final_elapsed_secs),
        snapshot.frame_count
    );

    if snapshot.feedback_log.is_empty() {
        println!("No corrections.");
    } else {
        println!("Corrections:");
        for message in &snapshot.feedback_log {
            println!("  {}. {}", message.ordinal + 1, message.text);
        }
    }

    match snapshot.state.clinical_score {
        Some(score) => {
            let verdict = ScoreVerdict::classify(
                score,
                settings.score_display_min,
                settings.score_display_max,
            );
            match verdict {
                ScoreVerdict::WithinRange => println!("Clinical score: {score}"),
                ScoreVerdict::TooManyMistakes => {
                    println!("Clinical score: {score} (too many mistakes)")
                }
            }
        }
        None => println!("Clinical score unavailable."),
    }
}

/// Default settings file under the user's home, next to other per-user config.
pub fn default_settings_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".physio-coach").join("settings.json"))
}
