pub mod buffer;
pub mod controller;
pub mod state;

pub use buffer::SessionSeries;
pub use controller::{SessionController, SessionSnapshot};
pub use state::{display_secs, SessionState, SessionStatus};
