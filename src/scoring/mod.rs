pub mod client;
pub mod finalizer;

pub use client::{HttpScoringService, ScoringService};
pub use finalizer::{ClinicalScore, ClinicalScoreFinalizer, ScoreSource, ScoreVerdict};
