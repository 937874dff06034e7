use crate::error::Result;
use crate::progress::{ProgressAccumulator, SessionId, SessionPhase};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Progress payload written to the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub session_id: SessionId,
    pub elapsed_units: u64,
    pub percent: u8,
    pub completed: bool,
}

impl ProgressUpdate {
    fn from_accumulator(acc: &ProgressAccumulator) -> Self {
        Self {
            session_id: acc.session_id().clone(),
            elapsed_units: acc.elapsed_units(),
            percent: acc.percent_complete(),
            completed: acc.is_completed(),
        }
    }

    fn completion(acc: &ProgressAccumulator) -> Self {
        Self {
            session_id: acc.session_id().clone(),
            elapsed_units: acc.elapsed_units(),
            percent: 100,
            completed: true,
        }
    }
}

/// Remote destination for progress; transport is up to the implementor
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn save_progress(&self, update: &ProgressUpdate) -> Result<()>;
}

/// Session state shared between the tick driver and flush tasks
#[derive(Debug)]
pub struct SessionState {
    pub accumulator: ProgressAccumulator,
    pub phase: SessionPhase,
    pub paused: bool,
}

impl SessionState {
    pub fn new(accumulator: ProgressAccumulator) -> Self {
        Self {
            accumulator,
            phase: SessionPhase::Idle,
            paused: false,
        }
    }

    pub fn transition(&mut self, next: SessionPhase) -> bool {
        if !self.phase.can_transition_to(next) {
            return false;
        }
        tracing::debug!(
            session = %self.accumulator.session_id(),
            from = ?self.phase,
            to = ?next,
            "Session phase change"
        );
        self.phase = next;
        true
    }
}

pub type SharedSession = Arc<Mutex<SessionState>>;

pub(crate) fn lock_session(session: &SharedSession) -> std::sync::MutexGuard<'_, SessionState> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Batches locally accumulated progress and writes it out on a coarse cadence
pub struct SyncBuffer {
    store: Arc<dyn ProgressStore>,
    flush_in_flight: AtomicBool,
    completion_dispatched: AtomicBool,
    completion_synced: AtomicBool,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl SyncBuffer {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            flush_in_flight: AtomicBool::new(false),
            completion_dispatched: AtomicBool::new(false),
            completion_synced: AtomicBool::new(false),
            dispatched: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Periodic flush. Returns whether a network write was dispatched.
    pub fn flush_periodic(self: &Arc<Self>, session: &SharedSession) -> bool {
        let update = {
            let state = lock_session(session);
            if state.phase == SessionPhase::Disposed
                || self.completion_dispatched.load(Ordering::Acquire)
            {
                return false;
            }
            if !state.accumulator.needs_sync() {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            if self.flush_in_flight.swap(true, Ordering::AcqRel) {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            ProgressUpdate::from_accumulator(&state.accumulator)
        };

        let buffer = self.clone();
        let session = session.clone();
        let spawned = self.spawn(async move {
            let result = buffer.store.save_progress(&update).await;
            buffer.settle(&session, &update, result, false);
            buffer.flush_in_flight.store(false, Ordering::Release);
        });
        if !spawned {
            self.flush_in_flight.store(false, Ordering::Release);
        }
        spawned
    }

    /// Out-of-band `completed=true, percent=100` write. Periodic flushing
    /// stops once this has been dispatched.
    pub fn flush_completion(self: &Arc<Self>, session: &SharedSession) -> bool {
        if self.completion_dispatched.swap(true, Ordering::AcqRel) {
            return false;
        }

        let update = {
            let state = lock_session(session);
            if state.phase == SessionPhase::Disposed {
                return false;
            }
            ProgressUpdate::completion(&state.accumulator)
        };

        let buffer = self.clone();
        let session = session.clone();
        self.spawn(async move {
            let result = buffer.store.save_progress(&update).await;
            buffer.settle(&session, &update, result, true);
        })
    }

    /// Record that the remote store already holds the completed state
    pub fn mark_completion_synced(&self) {
        self.completion_dispatched.store(true, Ordering::Release);
        self.completion_synced.store(true, Ordering::Release);
    }

    /// Final write for teardown, if anything is unsynced.
    /// Must be called while the session is still locked, before it is
    /// marked disposed.
    pub fn dispose_update(&self, state: &SessionState) -> Option<ProgressUpdate> {
        if self.completion_synced.load(Ordering::Acquire) {
            return None;
        }
        let acc = &state.accumulator;
        if acc.is_completed() {
            return Some(ProgressUpdate::completion(acc));
        }
        if acc.needs_sync() {
            return Some(ProgressUpdate::from_accumulator(acc));
        }
        None
    }

    /// Fire-and-forget write whose outcome never touches session state
    pub fn dispatch_detached(self: &Arc<Self>, update: ProgressUpdate) -> bool {
        let buffer = self.clone();
        self.spawn(async move {
            match buffer.store.save_progress(&update).await {
                Ok(()) => {
                    buffer.succeeded.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(session = %update.session_id, "Final flush saved");
                }
                Err(e) => {
                    buffer.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(session = %update.session_id, "Final flush failed: {}", e);
                }
            }
        })
    }

    pub fn is_completion_synced(&self) -> bool {
        self.completion_synced.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> FlushStats {
        FlushStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    fn settle(&self, session: &SharedSession, update: &ProgressUpdate, result: Result<()>, completion: bool) {
        let mut state = lock_session(session);
        if state.phase == SessionPhase::Disposed {
            // Late result after teardown
            return;
        }

        match result {
            Ok(()) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                state.accumulator.record_synced(update.elapsed_units);
                if completion {
                    self.completion_synced.store(true, Ordering::Release);
                }
                tracing::debug!(
                    session = %update.session_id,
                    elapsed = update.elapsed_units,
                    percent = update.percent,
                    "Progress flushed"
                );
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    session = %update.session_id,
                    elapsed = update.elapsed_units,
                    "Progress flush failed, will retry on next flush: {}",
                    e
                );
            }
        }
    }

    fn spawn<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                handle.spawn(fut);
                true
            }
            Err(_) => {
                tracing::debug!("No async runtime available, flush dropped");
                false
            }
        }
    }
}
