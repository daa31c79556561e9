//! Discrete clock events, published alongside the snapshot stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Phase;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Stopped by an explicit command (stop, reset, or owner dropped).
    User,
    /// The run reached its configured session length.
    Completed,
}

/// Something that happened to the session clock.
///
/// Snapshots carry the continuous state; events mark the edges a UI reacts to
/// once (a haptic pulse on phase change, a "well done" on completion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClockEvent {
    Started {
        run_id: Uuid,
        started_at: DateTime<Utc>,
    },
    PhaseChanged {
        run_id: Uuid,
        from: Phase,
        to: Phase,
        /// Cycle count after the transition.
        cycle_count: u32,
    },
    Stopped {
        run_id: Uuid,
        reason: StopReason,
        /// Whole seconds elapsed when the run stopped.
        total_elapsed_seconds: u32,
    },
    Reset,
}
