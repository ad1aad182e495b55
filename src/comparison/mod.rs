pub mod scheduler;

pub use scheduler::{completes_window, ComparisonScheduler, ComparisonWindow, WindowOutcome};
