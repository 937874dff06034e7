//! Owned session object tying the progress accumulator, the tick timer and
//! the remote sync buffer to one view's lifetime.
//!
//! A `SessionTracker` is created when a trackable view mounts and disposed
//! when it unmounts. Dropping it disposes it.

mod driver;
mod signals;

pub use signals::ProgressCallback;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::progress::{ProgressAccumulator, ProgressSnapshot, SessionId, SessionPhase, TickOutcome};
use crate::sync::{lock_session, FlushStats, ProgressStore, SessionState, SharedSession, SyncBuffer};
use signals::Signals;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub(crate) struct TrackerInner {
    pub(crate) session_id: SessionId,
    pub(crate) session: SharedSession,
    pub(crate) buffer: Arc<SyncBuffer>,
    pub(crate) shutdown: Notify,
    signals: Signals,
}

impl TrackerInner {
    /// Advance one unit. Returns the phase after the tick.
    pub(crate) fn handle_tick(&self) -> SessionPhase {
        let (outcome, snapshot) = {
            let mut state = lock_session(&self.session);
            match state.phase {
                SessionPhase::Disposed => {
                    tracing::trace!(session = %self.session_id, "Tick after dispose ignored");
                    return SessionPhase::Disposed;
                }
                SessionPhase::Completing | SessionPhase::Completed => return state.phase,
                SessionPhase::Idle | SessionPhase::Active => {}
            }
            if state.paused {
                return state.phase;
            }
            state.transition(SessionPhase::Active);

            let outcome = state.accumulator.tick();
            if outcome == TickOutcome::Completed {
                state.transition(SessionPhase::Completing);
            }
            (outcome, state.accumulator.snapshot())
        };

        match outcome {
            TickOutcome::Advanced => {
                self.signals.progress(&snapshot);
                SessionPhase::Active
            }
            TickOutcome::Completed => self.finish(snapshot),
            TickOutcome::Ignored => self.phase(),
        }
    }

    fn mark_complete(&self) -> bool {
        let snapshot = {
            let mut state = lock_session(&self.session);
            if state.phase.is_terminal() || state.phase == SessionPhase::Completing {
                return false;
            }
            if !state.accumulator.mark_complete() {
                return false;
            }
            state.transition(SessionPhase::Completing);
            state.accumulator.snapshot()
        };

        self.finish(snapshot);
        true
    }

    /// Completing -> Completed: final flush, stop timers, signal once
    fn finish(&self, snapshot: ProgressSnapshot) -> SessionPhase {
        self.buffer.flush_completion(&self.session);
        self.shutdown.notify_one();

        let phase = {
            let mut state = lock_session(&self.session);
            state.transition(SessionPhase::Completed);
            state.phase
        };
        if phase != SessionPhase::Completed {
            return phase;
        }

        tracing::info!(
            session = %self.session_id,
            elapsed = snapshot.elapsed_units,
            "Session completed"
        );
        self.signals.progress(&snapshot);
        self.signals.complete(&snapshot);
        phase
    }

    fn phase(&self) -> SessionPhase {
        lock_session(&self.session).phase
    }
}

/// Tracks one resource/conversation session from mount to teardown
pub struct SessionTracker {
    config: TrackerConfig,
    inner: Arc<TrackerInner>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SessionTracker {
    /// `target` of `None` or zero falls back to the configured default
    pub fn new(
        config: TrackerConfig,
        session_id: impl Into<SessionId>,
        target: Option<u64>,
        store: Arc<dyn ProgressStore>,
    ) -> Self {
        let session_id = session_id.into();
        let accumulator =
            ProgressAccumulator::with_default_target(session_id.clone(), target, config.default_target_units);

        Self {
            config,
            inner: Arc::new(TrackerInner {
                session_id,
                session: Arc::new(Mutex::new(SessionState::new(accumulator))),
                buffer: Arc::new(SyncBuffer::new(store)),
                shutdown: Notify::new(),
                signals: Signals::default(),
            }),
            driver: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Resume from a saved percentage; only before the session starts.
    /// Seeding 100% completes the session without a write.
    pub fn set_initial_progress(&self, percent: f64) -> Result<()> {
        let mut state = lock_session(&self.inner.session);
        if state.phase != SessionPhase::Idle {
            return Err(TrackerError::InvalidState(format!(
                "cannot seed progress in phase {:?}",
                state.phase
            )));
        }

        if state.accumulator.set_initial_progress(percent)? {
            self.inner.buffer.mark_completion_synced();
            state.transition(SessionPhase::Completed);
        }
        Ok(())
    }

    /// Spawn the tick and flush timers. Must be called within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.config.validate()?;
        let flush_interval = self.config.flush_interval()?;

        let mut slot = self.driver.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(TrackerError::AlreadyRunning);
        }

        {
            let mut state = lock_session(&self.inner.session);
            match state.phase {
                SessionPhase::Idle => {
                    state.transition(SessionPhase::Active);
                }
                SessionPhase::Active => {}
                SessionPhase::Disposed => return Err(TrackerError::UseAfterDispose),
                phase => {
                    return Err(TrackerError::InvalidState(format!(
                        "cannot start session in phase {:?}",
                        phase
                    )))
                }
            }
        }

        let inner = self.inner.clone();
        let tick_interval = self.config.tick_interval;
        *slot = Some(tokio::spawn(driver::run(inner, tick_interval, flush_interval)));

        tracing::info!(
            session = %self.inner.session_id,
            tick_ms = tick_interval.as_millis() as u64,
            flush_ms = flush_interval.as_millis() as u64,
            "Session tracking started"
        );
        Ok(())
    }

    /// Advance by one unit outside the timer. Ignored once completed,
    /// paused or disposed.
    pub fn tick(&self) -> SessionPhase {
        self.inner.handle_tick()
    }

    /// Explicit completion by the user. Returns `true` if this call
    /// completed the session.
    pub fn mark_complete(&self) -> bool {
        self.inner.mark_complete()
    }

    /// Stop counting time while the user is not engaged
    pub fn pause(&self) {
        lock_session(&self.inner.session).paused = true;
    }

    pub fn resume(&self) {
        lock_session(&self.inner.session).paused = false;
    }

    pub fn is_paused(&self) -> bool {
        lock_session(&self.inner.session).paused
    }

    /// Flush now instead of waiting for the next flush tick
    pub fn flush_now(&self) -> bool {
        self.inner.buffer.flush_periodic(&self.inner.session)
    }

    /// Tear down: stop timers and fire one best-effort final flush.
    /// Idempotent; never waits on the network.
    pub fn dispose(&self) {
        let update = {
            let mut state = lock_session(&self.inner.session);
            if state.phase == SessionPhase::Disposed {
                return;
            }
            let update = self.inner.buffer.dispose_update(&state);
            state.transition(SessionPhase::Disposed);
            update
        };

        self.inner.shutdown.notify_one();
        if let Some(task) = self.driver.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }

        if let Some(update) = update {
            self.inner.buffer.dispatch_detached(update);
        }
        tracing::debug!(session = %self.inner.session_id, "Session disposed");
    }

    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.inner.signals.set_on_progress(Arc::new(callback));
    }

    /// Invoked exactly once, when the session completes
    pub fn on_complete<F>(&self, callback: F)
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.inner.signals.set_on_complete(Arc::new(callback));
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        lock_session(&self.inner.session).accumulator.snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.phase()
    }

    pub fn last_synced_units(&self) -> u64 {
        lock_session(&self.inner.session).accumulator.last_synced_units()
    }

    pub fn flush_stats(&self) -> FlushStats {
        self.inner.buffer.stats()
    }
}

impl Drop for SessionTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}
