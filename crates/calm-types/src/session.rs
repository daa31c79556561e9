//! Breathing phases, session configuration and state snapshots.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current phase of a box breathing session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No run in progress (before start or after reset).
    #[default]
    Idle,
    /// Breathe in.
    Inhale,
    /// Hold after inhaling.
    HoldIn,
    /// Breathe out.
    Exhale,
    /// Hold after exhaling. Leaving this phase completes a cycle.
    HoldOut,
}

impl Phase {
    /// The phase that follows this one in the breathing cycle.
    ///
    /// `Idle` leads into `Inhale`; `HoldOut` wraps back to `Inhale`.
    pub fn next(self) -> Phase {
        match self {
            Phase::Idle => Phase::Inhale,
            Phase::Inhale => Phase::HoldIn,
            Phase::HoldIn => Phase::Exhale,
            Phase::Exhale => Phase::HoldOut,
            Phase::HoldOut => Phase::Inhale,
        }
    }

    /// Whether moving to the next phase completes a full cycle.
    pub fn completes_cycle(self) -> bool {
        match self {
            Phase::HoldOut => true,
            Phase::Idle | Phase::Inhale | Phase::HoldIn | Phase::Exhale => false,
        }
    }

    /// Instruction text shown to the user for this phase.
    pub fn instruction(self) -> &'static str {
        match self {
            Phase::Idle => "Ready to begin",
            Phase::Inhale => "Breathe In",
            Phase::HoldIn => "Hold",
            Phase::Exhale => "Breathe Out",
            Phase::HoldOut => "Hold",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Inhale => "inhale",
            Phase::HoldIn => "hold_in",
            Phase::Exhale => "exhale",
            Phase::HoldOut => "hold_out",
        };
        f.write_str(name)
    }
}

/// A configuration value the session refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "Phase duration {0}s out of range ({min}..={max}s)",
        min = SessionConfig::MIN_PHASE_DURATION,
        max = SessionConfig::MAX_PHASE_DURATION
    )]
    PhaseDurationOutOfRange(u32),

    #[error(
        "Session length {0}s out of range ({min}..={max}s)",
        min = SessionConfig::MIN_SESSION_LENGTH,
        max = SessionConfig::MAX_SESSION_LENGTH
    )]
    SessionLengthOutOfRange(u32),

    #[error(
        "Session length {0}s is not a multiple of {step}s",
        step = SessionConfig::SESSION_LENGTH_STEP
    )]
    SessionLengthStep(u32),
}

/// User-adjustable session parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Length of each of the four phases, in seconds.
    pub phase_duration_seconds: u32,
    /// Total length of one run, in seconds.
    pub session_length_seconds: u32,
}

impl SessionConfig {
    pub const MIN_PHASE_DURATION: u32 = 3;
    pub const MAX_PHASE_DURATION: u32 = 5;
    pub const DEFAULT_PHASE_DURATION: u32 = 4;

    pub const MIN_SESSION_LENGTH: u32 = 10;
    pub const MAX_SESSION_LENGTH: u32 = 300;
    pub const SESSION_LENGTH_STEP: u32 = 10;
    pub const DEFAULT_SESSION_LENGTH: u32 = 30;

    /// Check a phase duration against the allowed range.
    pub fn check_phase_duration(seconds: u32) -> Result<(), ConfigError> {
        if (Self::MIN_PHASE_DURATION..=Self::MAX_PHASE_DURATION).contains(&seconds) {
            Ok(())
        } else {
            Err(ConfigError::PhaseDurationOutOfRange(seconds))
        }
    }

    /// Check a session length against the allowed range and step.
    pub fn check_session_length(seconds: u32) -> Result<(), ConfigError> {
        if !(Self::MIN_SESSION_LENGTH..=Self::MAX_SESSION_LENGTH).contains(&seconds) {
            return Err(ConfigError::SessionLengthOutOfRange(seconds));
        }
        if seconds % Self::SESSION_LENGTH_STEP != 0 {
            return Err(ConfigError::SessionLengthStep(seconds));
        }
        Ok(())
    }

    /// Validate both fields, reporting the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::check_phase_duration(self.phase_duration_seconds)?;
        Self::check_session_length(self.session_length_seconds)
    }

    pub fn phase_duration_ms(&self) -> u64 {
        u64::from(self.phase_duration_seconds) * 1000
    }

    pub fn session_length_ms(&self) -> u64 {
        u64::from(self.session_length_seconds) * 1000
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            phase_duration_seconds: Self::DEFAULT_PHASE_DURATION,
            session_length_seconds: Self::DEFAULT_SESSION_LENGTH,
        }
    }
}

/// Immutable snapshot of a breathing session.
///
/// This is the only thing the clock hands to observers. Every tick or command
/// that changes anything publishes a fresh value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub is_active: bool,
    pub phase: Phase,
    /// Fraction of the current phase elapsed, in `[0.0, 1.0)`.
    pub progress: f32,
    /// Completed inhale-hold-exhale-hold cycles.
    pub cycle_count: u32,
    /// Whole seconds elapsed in the current phase.
    pub current_second: u32,
    /// Whole seconds elapsed in the current run.
    pub total_elapsed_seconds: u32,
    pub config: SessionConfig,
}

impl SessionState {
    /// A fresh idle snapshot carrying the given configuration.
    pub fn idle(config: SessionConfig) -> Self {
        Self {
            is_active: false,
            phase: Phase::Idle,
            progress: 0.0,
            cycle_count: 0,
            current_second: 0,
            total_elapsed_seconds: 0,
            config,
        }
    }

    /// Countdown number for the current phase (e.g. 4, 3, 2, 1).
    pub fn seconds_remaining_in_phase(&self) -> u32 {
        self.config
            .phase_duration_seconds
            .saturating_sub(self.current_second)
    }

    /// Seconds left before the run completes.
    pub fn session_seconds_remaining(&self) -> u32 {
        self.config
            .session_length_seconds
            .saturating_sub(self.total_elapsed_seconds)
    }

    pub fn instruction(&self) -> &'static str {
        self.phase.instruction()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::idle(SessionConfig::default())
    }
}
