use std::path::PathBuf;

use clap::Parser;
use physio_coach_lib::{default_settings_path, run, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "physio-coach")]
#[command(about = "Score a recorded exercise attempt against its reference motion")]
struct Args {
    /// Exercise identifier used by the scoring service (e.g. Es1)
    #[arg(short, long)]
    exercise: String,

    /// Reference video URL
    #[arg(long, default_value = "")]
    video: String,

    /// Reference joint table (URL or path)
    #[arg(short, long)]
    reference: String,

    /// Recorded session table replayed as the live capture
    #[arg(long)]
    replay: String,

    /// Settings file; defaults to ~/.physio-coach/settings.json
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Scoring service base URL, overrides settings
    #[arg(long)]
    scoring_url: Option<String>,

    /// Save the effective settings to the settings file
    #[arg(long)]
    write_settings: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings_path = match args.settings {
        Some(path) => path,
        None => default_settings_path()?,
    };
    let video_url = if args.video.is_empty() {
        format!("{}.mp4", args.exercise)
    } else {
        args.video
    };

    run(RunOptions {
        exercise_id: args.exercise,
        video_url,
        reference_track: args.reference,
        replay: args.replay,
        settings_path,
        scoring_url: args.scoring_url,
        write_settings: args.write_settings,
    })
    .await
}
