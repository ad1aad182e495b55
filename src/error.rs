//! Failure taxonomy for an exercise session.
//!
//! Component code returns `anyhow::Result`; these variants are attached at the
//! boundary so callers can classify with `err.downcast_ref::<SessionError>()`.

use thiserror::Error;

use crate::session::SessionStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Camera or stream acquisition failed. Blocks `start` until remedied.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Reference video or track could not be loaded. Retry to recover.
    #[error("reference load failed: {0}")]
    ReferenceLoad(String),

    #[error("reference assets still loading")]
    ReferenceNotReady,

    /// Remote scoring call failed or returned nothing usable.
    #[error("scoring service failure: {0}")]
    ScoringService(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("cannot {command} while {status:?}")]
    InvalidTransition {
        command: &'static str,
        status: SessionStatus,
    },
}

impl SessionError {
    /// Errors that keep an attempt from starting until the user acts.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            SessionError::CaptureUnavailable(_)
                | SessionError::ReferenceLoad(_)
                | SessionError::ReferenceNotReady
        )
    }
}
