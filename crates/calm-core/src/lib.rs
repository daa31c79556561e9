//! Box breathing session engine: phase state machine, tick-driven clock and
//! the controller façade a UI drives.

mod clock;
mod controller;
mod error;
mod machine;

use std::time::Duration;

pub use clock::SessionClock;
pub use controller::{SessionCommand, SessionController};
pub use error::CalmError;
pub use machine::{ClockCore, PhaseTransition, TickOutcome};

/// Tick interval of the session clock, in milliseconds (~60 updates/second).
pub const UPDATE_INTERVAL_MS: u64 = 16;

/// Tick interval of the session clock.
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(UPDATE_INTERVAL_MS);

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, CalmError>;
