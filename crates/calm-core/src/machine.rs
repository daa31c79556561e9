//! Deterministic phase/time state machine behind the session clock.
//!
//! All timing is integer milliseconds. Phase boundaries are found from the
//! absolute elapsed accumulator, so late or coalesced ticks never shift where
//! a phase ends, and the tick size has no effect on phase length.

use crate::{CalmError, Result};
use calm_types::{Phase, SessionConfig, SessionState};

/// A single phase transition produced by [`ClockCore::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    /// Cycle count after the transition.
    pub cycle_count: u32,
}

/// Result of advancing the machine by one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Transitions crossed during this tick, in order.
    pub transitions: Vec<PhaseTransition>,
    /// The run reached its session length on this tick and is now inactive.
    pub completed: bool,
}

/// The breathing session state machine.
///
/// Holds the last computed snapshot so that a stopped session keeps showing
/// exactly what it showed when it stopped.
#[derive(Debug, Clone)]
pub struct ClockCore {
    config: SessionConfig,
    elapsed_ms: u64,
    state: SessionState,
}

impl ClockCore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            elapsed_ms: 0,
            state: SessionState::idle(config),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Begin a new run from the first inhale.
    pub fn start(&mut self) -> Result<()> {
        if self.state.is_active {
            return Err(CalmError::AlreadyActive);
        }
        self.elapsed_ms = 0;
        self.state = SessionState {
            is_active: true,
            phase: Phase::Inhale,
            ..SessionState::idle(self.config)
        };
        Ok(())
    }

    /// Advance the accumulator by `dt_ms` and recompute the snapshot.
    ///
    /// Does nothing while inactive.
    pub fn advance(&mut self, dt_ms: u64) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if !self.state.is_active {
            return outcome;
        }

        let phase_ms = self.config.phase_duration_ms();
        let session_ms = self.config.session_length_ms();

        let previous = self.elapsed_ms;
        let elapsed = previous.saturating_add(dt_ms).min(session_ms);
        let crossed = elapsed / phase_ms - previous / phase_ms;

        let mut phase = self.state.phase;
        let mut cycle_count = self.state.cycle_count;
        for _ in 0..crossed {
            let from = phase;
            if from.completes_cycle() {
                cycle_count += 1;
            }
            phase = from.next();
            outcome.transitions.push(PhaseTransition {
                from,
                to: phase,
                cycle_count,
            });
        }

        self.elapsed_ms = elapsed;
        outcome.completed = elapsed >= session_ms;

        let into_phase = elapsed % phase_ms;
        self.state = SessionState {
            is_active: !outcome.completed,
            phase,
            progress: into_phase as f32 / phase_ms as f32,
            cycle_count,
            current_second: (into_phase / 1000) as u32,
            total_elapsed_seconds: (elapsed / 1000) as u32,
            config: self.config,
        };

        outcome
    }

    /// Mark the run inactive, keeping phase, progress and cycle count.
    ///
    /// Returns whether the machine was active.
    pub fn stop(&mut self) -> bool {
        let was_active = self.state.is_active;
        self.state.is_active = false;
        was_active
    }

    /// Return to a fresh idle snapshot, keeping the configuration.
    pub fn reset(&mut self) {
        self.state.is_active = false;
        self.elapsed_ms = 0;
        self.state = SessionState::idle(self.config);
    }

    pub fn set_phase_duration(&mut self, seconds: u32) -> Result<()> {
        self.ensure_inactive()?;
        SessionConfig::check_phase_duration(seconds)?;
        self.apply(SessionConfig {
            phase_duration_seconds: seconds,
            ..self.config
        });
        Ok(())
    }

    pub fn set_session_length(&mut self, seconds: u32) -> Result<()> {
        self.ensure_inactive()?;
        SessionConfig::check_session_length(seconds)?;
        self.apply(SessionConfig {
            session_length_seconds: seconds,
            ..self.config
        });
        Ok(())
    }

    /// Replace the whole configuration at once.
    pub fn configure(&mut self, config: SessionConfig) -> Result<()> {
        self.ensure_inactive()?;
        config.validate()?;
        self.apply(config);
        Ok(())
    }

    /// Install a validated config. The retained second is rescaled from the
    /// kept progress so it stays inside the new phase duration.
    fn apply(&mut self, config: SessionConfig) {
        let duration = config.phase_duration_seconds;
        let rescaled = (self.state.progress * duration as f32).floor() as u32;
        self.config = config;
        self.state.config = config;
        self.state.current_second = rescaled.min(duration.saturating_sub(1));
    }

    fn ensure_inactive(&self) -> Result<()> {
        if self.state.is_active {
            Err(CalmError::SessionActive)
        } else {
            Ok(())
        }
    }
}

impl Default for ClockCore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
