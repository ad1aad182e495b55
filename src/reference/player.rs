use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

/// Playback surface for the reference video. Only the session state machine drives it.
#[async_trait]
pub trait ReferencePlayer: Send + Sync {
    /// Prepare the media at `url`; resolves once playable.
    async fn load(&self, url: &str) -> Result<()>;

    /// Seek to the beginning and start looping playback.
    fn play_from_start(&self) -> Result<()>;

    fn pause_and_rewind(&self) -> Result<()>;

    fn is_playing(&self) -> bool;
}

/// Player with no output, for headless runs. Tracks play state only.
#[derive(Default)]
pub struct HeadlessPlayer {
    url: Mutex<Option<String>>,
    playing: AtomicBool,
}

impl HeadlessPlayer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReferencePlayer for HeadlessPlayer {
    async fn load(&self, url: &str) -> Result<()> {
        if url.trim().is_empty() {
            anyhow::bail!("reference video url is empty");
        }
        let mut guard = match self.url.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(url.to_string());
        Ok(())
    }

    fn play_from_start(&self) -> Result<()> {
        self.playing.store(true, Ordering::SeqCst);
        log::debug!("reference playback started from 0");
        Ok(())
    }

    fn pause_and_rewind(&self) -> Result<()> {
        self.playing.store(false, Ordering::SeqCst);
        log::debug!("reference playback paused and rewound");
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}
