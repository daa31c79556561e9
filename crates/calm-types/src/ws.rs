//! WebSocket message protocol between a UI client and the session bridge.

use serde::{Deserialize, Serialize};

use crate::{Phase, SessionState, StopReason};

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    Start,
    Stop,
    Reset,
    SetPhaseDuration { seconds: u32 },
    SetSessionLength { seconds: u32 },
    /// Step controls for the +/- buttons.
    IncreasePhaseDuration,
    DecreasePhaseDuration,
    IncreaseSessionLength,
    DecreaseSessionLength,
    /// Request the current snapshot.
    GetState,
    /// Ping for keepalive.
    Ping { timestamp: u64 },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// Latest snapshot, sent on connect and whenever it changes.
    State {
        state: SessionState,
        instruction: String,
    },
    /// Phase transition; clients fire their haptic cue on this.
    PhaseChanged {
        from: Phase,
        to: Phase,
        cycle_count: u32,
    },
    /// The run ended, either by user command or by reaching its length.
    SessionStopped {
        reason: StopReason,
        total_elapsed_seconds: u32,
    },
    /// Error message.
    Error { code: String, message: String },
    /// Pong response.
    Pong { timestamp: u64 },
}

impl WsServerMessage {
    pub fn state(state: SessionState) -> Self {
        Self::State {
            instruction: state.instruction().to_string(),
            state,
        }
    }
}
