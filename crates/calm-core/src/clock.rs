//! Session clock: drives the state machine on a fixed tick and publishes
//! snapshots.

use crate::machine::{ClockCore, TickOutcome};
use crate::{CalmError, Result, UPDATE_INTERVAL, UPDATE_INTERVAL_MS};
use calm_types::{ClockEvent, SessionConfig, SessionState, StopReason};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Timer-driven breathing session.
///
/// The tick task is the only writer during a run; commands take the same lock,
/// so every published snapshot comes out of exactly one critical section.
/// Observers get immutable [`SessionState`] values through a watch channel and
/// discrete [`ClockEvent`]s through a broadcast channel.
///
/// `start` spawns onto the current tokio runtime and must be called from
/// within one.
#[derive(Clone)]
pub struct SessionClock {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionState>,
    event_tx: broadcast::Sender<ClockEvent>,
}

struct Inner {
    core: ClockCore,
    /// Bumped on every start and stop; a tick from an older run publishes nothing.
    generation: u64,
    run: Option<Run>,
}

struct Run {
    id: Uuid,
    handle: JoinHandle<()>,
}

impl SessionClock {
    pub fn new(config: SessionConfig) -> Self {
        let core = ClockCore::new(config);
        let (state_tx, _) = watch::channel(core.snapshot());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    core,
                    generation: 0,
                    run: None,
                }),
                state_tx,
                event_tx,
            }),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> SessionState {
        *self.shared.state_tx.borrow()
    }

    /// Subscribe to snapshots. The receiver always holds the latest one.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to phase changes, starts and stops.
    pub fn events(&self) -> broadcast::Receiver<ClockEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.snapshot().is_active
    }

    /// Start a run and return its id.
    pub fn start(&self) -> Result<Uuid> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CalmError::NoRuntime)?;

        let mut inner = self.shared.lock();
        inner.core.start()?;
        inner.generation += 1;

        let id = Uuid::new_v4();
        let generation = inner.generation;
        let shared = self.shared.clone();
        let handle = runtime.spawn(async move { run_ticks(shared, generation).await });
        inner.run = Some(Run { id, handle });

        let state = inner.core.snapshot();
        self.shared.state_tx.send_replace(state);
        let _ = self.shared.event_tx.send(ClockEvent::Started {
            run_id: id,
            started_at: chrono::Utc::now(),
        });

        info!(
            target: "calm::clock",
            "Run {} started ({}s phases, {}s session)",
            id, state.config.phase_duration_seconds, state.config.session_length_seconds
        );
        Ok(id)
    }

    /// Stop the current run, keeping phase, progress and cycle count.
    ///
    /// The tick task is cancelled before this returns; no snapshot from the
    /// stopped run is published afterwards. Calling it while stopped does
    /// nothing.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        self.shared.stop_locked(&mut inner);
    }

    /// Stop, then replace the snapshot with a fresh idle one that keeps the
    /// current configuration.
    pub fn reset(&self) {
        let mut inner = self.shared.lock();
        self.shared.stop_locked(&mut inner);
        inner.core.reset();
        self.shared.state_tx.send_replace(inner.core.snapshot());
        let _ = self.shared.event_tx.send(ClockEvent::Reset);
        debug!(target: "calm::clock", "Session reset");
    }

    pub fn set_phase_duration(&self, seconds: u32) -> Result<()> {
        self.reconfigure(|core| core.set_phase_duration(seconds))
    }

    pub fn set_session_length(&self, seconds: u32) -> Result<()> {
        self.reconfigure(|core| core.set_session_length(seconds))
    }

    pub fn configure(&self, config: SessionConfig) -> Result<()> {
        self.reconfigure(|core| core.configure(config))
    }

    pub fn increase_phase_duration(&self) -> Result<()> {
        self.reconfigure(|core| {
            let seconds = core.config().phase_duration_seconds.saturating_add(1);
            core.set_phase_duration(seconds)
        })
    }

    pub fn decrease_phase_duration(&self) -> Result<()> {
        self.reconfigure(|core| {
            let seconds = core.config().phase_duration_seconds.saturating_sub(1);
            core.set_phase_duration(seconds)
        })
    }

    pub fn increase_session_length(&self) -> Result<()> {
        self.reconfigure(|core| {
            let seconds = core
                .config()
                .session_length_seconds
                .saturating_add(SessionConfig::SESSION_LENGTH_STEP);
            core.set_session_length(seconds)
        })
    }

    pub fn decrease_session_length(&self) -> Result<()> {
        self.reconfigure(|core| {
            let seconds = core
                .config()
                .session_length_seconds
                .saturating_sub(SessionConfig::SESSION_LENGTH_STEP);
            core.set_session_length(seconds)
        })
    }

    fn reconfigure(&self, apply: impl FnOnce(&mut ClockCore) -> Result<()>) -> Result<()> {
        let mut inner = self.shared.lock();
        apply(&mut inner.core)?;
        let state = inner.core.snapshot();
        self.shared.state_tx.send_replace(state);
        debug!(
            target: "calm::clock",
            "Configuration now {}s phases, {}s session",
            state.config.phase_duration_seconds, state.config.session_length_seconds
        );
        Ok(())
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves the machine consistent, so a panic
        // elsewhere doesn't invalidate it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_locked(&self, inner: &mut Inner) {
        inner.generation += 1;
        let run = inner.run.take();
        if let Some(run) = &run {
            run.handle.abort();
        }
        if !inner.core.stop() {
            return;
        }

        let state = inner.core.snapshot();
        self.state_tx.send_replace(state);
        if let Some(run) = run {
            let _ = self.event_tx.send(ClockEvent::Stopped {
                run_id: run.id,
                reason: StopReason::User,
                total_elapsed_seconds: state.total_elapsed_seconds,
            });
            info!(
                target: "calm::clock",
                "Run {} stopped after {}s ({} cycles)",
                run.id, state.total_elapsed_seconds, state.cycle_count
            );
        }
    }

    /// Advance one interval. Returns whether the tick task should keep going.
    fn tick(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation || !inner.core.is_active() {
            return false;
        }

        let TickOutcome {
            transitions,
            completed,
        } = inner.core.advance(UPDATE_INTERVAL_MS);
        let state = inner.core.snapshot();
        self.state_tx.send_replace(state);
        trace!(
            target: "calm::clock::tick",
            "{} {:.3} ({}s elapsed)",
            state.phase, state.progress, state.total_elapsed_seconds
        );

        let run_id = inner.run.as_ref().map(|run| run.id).unwrap_or_default();
        for transition in transitions {
            debug!(
                target: "calm::clock",
                "Phase {} -> {} (cycle {})",
                transition.from, transition.to, transition.cycle_count
            );
            let _ = self.event_tx.send(ClockEvent::PhaseChanged {
                run_id,
                from: transition.from,
                to: transition.to,
                cycle_count: transition.cycle_count,
            });
        }

        if !completed {
            return true;
        }

        // The task finishes on its own; dropping the handle just detaches it.
        inner.run = None;
        inner.generation += 1;
        let _ = self.event_tx.send(ClockEvent::Stopped {
            run_id,
            reason: StopReason::Completed,
            total_elapsed_seconds: state.total_elapsed_seconds,
        });
        info!(
            target: "calm::clock",
            "Run {} completed after {}s ({} cycles, last phase {})",
            run_id, state.total_elapsed_seconds, state.cycle_count, state.phase
        );
        false
    }
}

async fn run_ticks(shared: Arc<Shared>, generation: u64) {
    let mut interval = tokio::time::interval_at(Instant::now() + UPDATE_INTERVAL, UPDATE_INTERVAL);
    // Late ticks are caught up rather than dropped so elapsed time follows the wall clock.
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        interval.tick().await;
        if !shared.tick(generation) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calm_types::Phase;
    use std::time::Duration;
    use tokio::time::sleep;

    fn config(phase: u32, session: u32) -> SessionConfig {
        SessionConfig {
            phase_duration_seconds: phase,
            session_length_seconds: session,
        }
    }

    #[test]
    fn test_start_outside_runtime_is_rejected() {
        let clock = SessionClock::default();
        assert_eq!(clock.start(), Err(CalmError::NoRuntime));
        assert_eq!(clock.snapshot(), SessionState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_publishes_inhale_snapshot() {
        let clock = SessionClock::default();
        let mut rx = clock.subscribe();
        rx.borrow_and_update();

        clock.start().unwrap();
        assert!(rx.has_changed().unwrap());
        let state = *rx.borrow_and_update();
        assert!(state.is_active);
        assert_eq!(state.phase, Phase::Inhale);
        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle_in_virtual_time() {
        let clock = SessionClock::new(config(4, 30));
        clock.start().unwrap();

        sleep(Duration::from_millis(16_008)).await;
        let state = clock.snapshot();
        assert!(state.is_active);
        assert_eq!(state.cycle_count, 1);
        assert_eq!(state.phase, Phase::Inhale);
        assert_eq!(state.total_elapsed_seconds, 16);
        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_auto_stops_at_length() {
        let clock = SessionClock::new(config(4, 10));
        let mut events = clock.events();
        clock.start().unwrap();

        sleep(Duration::from_millis(10_050)).await;
        let state = clock.snapshot();
        assert!(!state.is_active);
        assert!(state.total_elapsed_seconds <= 10);
        assert_eq!(state.phase, Phase::Exhale);

        let mut saw_completion = false;
        while let Ok(event) = events.try_recv() {
            if let ClockEvent::Stopped { reason, .. } = event {
                assert_eq!(reason, StopReason::Completed);
                saw_completion = true;
            }
        }
        assert!(saw_completion);

        // Completed runs can be started again.
        clock.start().unwrap();
        assert!(clock.is_active());
        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_active_changes_nothing() {
        let clock = SessionClock::default();
        clock.start().unwrap();
        sleep(Duration::from_millis(1_000)).await;

        let before = clock.snapshot();
        let mut rx = clock.subscribe();
        rx.borrow_and_update();

        assert_eq!(clock.start(), Err(CalmError::AlreadyActive));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(clock.snapshot(), before);
        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_snapshots_after_stop() {
        let clock = SessionClock::default();
        let mut rx = clock.subscribe();
        clock.start().unwrap();
        sleep(Duration::from_millis(500)).await;

        clock.stop();
        let stopped = *rx.borrow_and_update();
        assert!(!stopped.is_active);

        sleep(Duration::from_millis(2_000)).await;
        assert!(!rx.has_changed().unwrap());
        assert_eq!(clock.snapshot(), stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let clock = SessionClock::default();
        let mut events = clock.events();
        clock.start().unwrap();
        sleep(Duration::from_millis(100)).await;

        clock.stop();
        clock.stop();

        let stops = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| matches!(e, ClockEvent::Stopped { .. }))
            .count();
        assert_eq!(stops, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_after_run() {
        let clock = SessionClock::default();
        clock.set_phase_duration(3).unwrap();
        clock.set_session_length(120).unwrap();
        clock.start().unwrap();
        sleep(Duration::from_millis(14_000)).await;
        assert!(clock.snapshot().cycle_count >= 1);

        clock.reset();
        let state = clock.snapshot();
        assert!(!state.is_active);
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.progress, 0.0);
        assert_eq!(state.cycle_count, 0);
        assert_eq!(state.total_elapsed_seconds, 0);
        assert_eq!(state.config, config(3, 120));

        let mut rx = clock.subscribe();
        rx.borrow_and_update();
        sleep(Duration::from_millis(1_000)).await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_change_events_in_order() {
        let clock = SessionClock::new(config(3, 30));
        let mut events = clock.events();
        clock.start().unwrap();
        sleep(Duration::from_millis(12_010)).await;
        clock.stop();

        let phases: Vec<Phase> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|e| match e {
                ClockEvent::PhaseChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![Phase::HoldIn, Phase::Exhale, Phase::HoldOut, Phase::Inhale]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_configuration_leaves_state() {
        let clock = SessionClock::default();
        let before = clock.snapshot();

        assert!(clock.set_phase_duration(6).is_err());
        assert!(clock.set_session_length(5).is_err());
        assert_eq!(clock.snapshot(), before);

        clock.start().unwrap();
        assert_eq!(clock.set_phase_duration(3), Err(CalmError::SessionActive));
        assert_eq!(clock.snapshot().config, SessionConfig::default());
        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_controls_stop_at_range_edges() {
        let clock = SessionClock::default();

        clock.increase_phase_duration().unwrap();
        assert!(clock.increase_phase_duration().is_err());
        assert_eq!(clock.snapshot().config.phase_duration_seconds, 5);

        clock.decrease_phase_duration().unwrap();
        clock.decrease_phase_duration().unwrap();
        assert!(clock.decrease_phase_duration().is_err());
        assert_eq!(clock.snapshot().config.phase_duration_seconds, 3);

        clock.decrease_session_length().unwrap();
        clock.decrease_session_length().unwrap();
        assert!(clock.decrease_session_length().is_err());
        assert_eq!(clock.snapshot().config.session_length_seconds, 10);

        clock.configure(config(4, 290)).unwrap();
        clock.increase_session_length().unwrap();
        assert!(clock.increase_session_length().is_err());
        assert_eq!(clock.snapshot().config.session_length_seconds, 300);
    }
}
