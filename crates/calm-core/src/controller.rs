//! Façade between a UI and the session clock.

use crate::{Result, SessionClock};
use calm_types::{ClockEvent, SessionConfig, SessionState};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// A command a UI can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
    Reset,
    SetPhaseDuration(u32),
    SetSessionLength(u32),
    /// Replace both settings at once; nothing changes unless both are valid.
    Configure(SessionConfig),
    IncreasePhaseDuration,
    DecreasePhaseDuration,
    IncreaseSessionLength,
    DecreaseSessionLength,
}

/// Owns the session clock on behalf of a UI.
///
/// Commands are fire-and-forget: anything the clock refuses (starting twice,
/// reconfiguring mid-run, out-of-range values) is dropped with a debug log,
/// the same way a UI with disabled controls would never send it. Use
/// [`SessionController::execute`] to see the rejection instead.
///
/// Dropping the controller stops the clock.
pub struct SessionController {
    clock: SessionClock,
}

impl SessionController {
    /// Create a controller. An invalid configuration falls back to defaults.
    pub fn new(config: SessionConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!(target: "calm::controller", "Ignoring configuration ({}), using defaults", e);
                SessionConfig::default()
            }
        };
        Self {
            clock: SessionClock::new(config),
        }
    }

    /// Run a command, returning the resulting snapshot or the reason it was refused.
    pub fn execute(&self, command: SessionCommand) -> Result<SessionState> {
        match command {
            SessionCommand::Start => self.clock.start().map(|_| ())?,
            SessionCommand::Stop => self.clock.stop(),
            SessionCommand::Reset => self.clock.reset(),
            SessionCommand::SetPhaseDuration(seconds) => self.clock.set_phase_duration(seconds)?,
            SessionCommand::SetSessionLength(seconds) => self.clock.set_session_length(seconds)?,
            SessionCommand::Configure(config) => self.clock.configure(config)?,
            SessionCommand::IncreasePhaseDuration => self.clock.increase_phase_duration()?,
            SessionCommand::DecreasePhaseDuration => self.clock.decrease_phase_duration()?,
            SessionCommand::IncreaseSessionLength => self.clock.increase_session_length()?,
            SessionCommand::DecreaseSessionLength => self.clock.decrease_session_length()?,
        }
        Ok(self.clock.snapshot())
    }

    /// Run a command, ignoring a refusal.
    pub fn dispatch(&self, command: SessionCommand) {
        if let Err(e) = self.execute(command) {
            debug!(target: "calm::controller", "Ignoring {:?}: {}", command, e);
        }
    }

    pub fn start(&self) {
        self.dispatch(SessionCommand::Start);
    }

    pub fn stop(&self) {
        self.dispatch(SessionCommand::Stop);
    }

    pub fn reset(&self) {
        self.dispatch(SessionCommand::Reset);
    }

    pub fn set_phase_duration(&self, seconds: u32) {
        self.dispatch(SessionCommand::SetPhaseDuration(seconds));
    }

    pub fn set_session_length(&self, seconds: u32) {
        self.dispatch(SessionCommand::SetSessionLength(seconds));
    }

    pub fn configure(&self, config: SessionConfig) {
        self.dispatch(SessionCommand::Configure(config));
    }

    pub fn increase_phase_duration(&self) {
        self.dispatch(SessionCommand::IncreasePhaseDuration);
    }

    pub fn decrease_phase_duration(&self) {
        self.dispatch(SessionCommand::DecreasePhaseDuration);
    }

    pub fn increase_session_length(&self) {
        self.dispatch(SessionCommand::IncreaseSessionLength);
    }

    pub fn decrease_session_length(&self) {
        self.dispatch(SessionCommand::DecreaseSessionLength);
    }

    pub fn state(&self) -> SessionState {
        self.clock.snapshot()
    }

    /// Instruction text for the current phase.
    pub fn instruction(&self) -> &'static str {
        self.clock.snapshot().instruction()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.clock.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<ClockEvent> {
        self.clock.events()
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.clock.stop();
    }
}
