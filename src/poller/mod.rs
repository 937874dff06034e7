pub mod subscription;

pub use subscription::PollStats;

use crate::error::{Result, TrackerError};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use subscription::PollSubscription;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Source of data for a polling subscription
#[async_trait]
pub trait Fetcher<T: Send + 'static>: Send + Sync {
    async fn fetch(&self) -> Result<T>;
}

#[async_trait]
impl<T, F, Fut> Fetcher<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    async fn fetch(&self) -> Result<T> {
        (self)().await
    }
}

struct LoopHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

struct Shared<T: Send + 'static> {
    state: PollSubscription<T>,
    fetcher: Mutex<Option<Arc<dyn Fetcher<T>>>>,
    /// Task of the outstanding fetch. Its lock also serializes dispatch
    /// against stop.
    fetch_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Shared<T> {
    fn halt(&self) {
        let task = {
            let mut fetch_task = self.fetch_task.lock().unwrap_or_else(|e| e.into_inner());
            self.state.running.store(false, Ordering::Release);
            self.state.epoch.fetch_add(1, Ordering::AcqRel);
            self.state.in_flight.store(false, Ordering::Release);
            fetch_task.take()
        };
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// Held by a fetch task until its result is settled. Dropping it unsettled
/// (the fetch panicked or was aborted) releases the in-flight slot.
struct FetchGuard<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    epoch: u64,
    settled: bool,
}

impl<T: Send + 'static> Drop for FetchGuard<T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let state = &self.shared.state;
        if state.is_current(self.epoch) {
            tracing::warn!("Poll fetch ended without a result");
            state.record_failure();
            state.finish();
        } else {
            state.record_discard();
        }
    }
}

/// Invokes a fetcher on a fixed interval, never more than one at a time
pub struct PollingScheduler<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    handle: Mutex<Option<LoopHandle>>,
}

impl<T> PollingScheduler<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: PollSubscription::new(),
                fetcher: Mutex::new(None),
                fetch_task: Mutex::new(None),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Fetch once immediately, then every `period`.
    ///
    /// A running scheduler must be stopped before it can be started again
    /// with a different fetcher or period.
    pub fn start<F>(&self, fetcher: F, period: Duration) -> Result<()>
    where
        F: Fetcher<T> + 'static,
    {
        if period.is_zero() {
            return Err(TrackerError::Config("poll interval must be > 0".to_string()));
        }

        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.is_some() {
            return Err(TrackerError::AlreadyRunning);
        }

        *self.shared.fetcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(fetcher));
        let state = &self.shared.state;
        state.epoch.fetch_add(1, Ordering::AcqRel);
        state.in_flight.store(false, Ordering::Release);
        state.running.store(true, Ordering::Release);

        let shared = self.shared.clone();
        let shutdown = Arc::new(Notify::new());
        let loop_shutdown = shutdown.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::dispatch(&shared);
                    }
                    _ = loop_shutdown.notified() => {
                        break;
                    }
                }
            }
        });

        tracing::debug!(interval_ms = period.as_millis() as u64, "Polling started");
        *handle = Some(LoopHandle { shutdown, task });
        Ok(())
    }

    /// Cancel the timer and any outstanding fetch. The fetcher is not
    /// invoked again once this returns.
    pub fn stop(&self) {
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(handle) = handle else {
            return;
        };

        self.shared.halt();
        handle.shutdown.notify_one();
        handle.task.abort();
        tracing::debug!("Polling stopped");
    }

    /// Trigger a fetch now, subject to the in-flight guard.
    /// Returns whether a fetch was dispatched.
    pub fn refresh(&self) -> bool {
        Self::dispatch(&self.shared)
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.running.load(Ordering::Acquire)
    }

    pub fn is_in_flight(&self) -> bool {
        self.shared.state.in_flight.load(Ordering::Acquire)
    }

    /// Most recent successful result, kept across failed fetches
    pub fn last_result(&self) -> Option<T> {
        self.shared.state.last_result()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.shared.state.subscribe()
    }

    pub fn stats(&self) -> PollStats {
        self.shared.state.stats()
    }

    fn dispatch(shared: &Arc<Shared<T>>) -> bool {
        let mut fetch_task = shared.fetch_task.lock().unwrap_or_else(|e| e.into_inner());
        let state = &shared.state;
        if !state.running.load(Ordering::Acquire) {
            return false;
        }

        let fetcher = match shared.fetcher.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            Some(fetcher) => fetcher,
            None => return false,
        };

        let epoch = state.epoch.load(Ordering::Acquire);
        let Some(seq) = state.try_begin() else {
            tracing::trace!("Fetch still in flight, skipping tick");
            return false;
        };

        let mut guard = FetchGuard {
            shared: shared.clone(),
            epoch,
            settled: false,
        };
        *fetch_task = Some(tokio::spawn(async move {
            if !guard.shared.state.is_current(guard.epoch) {
                return;
            }
            let result = fetcher.fetch().await;
            Self::settle(&guard.shared, epoch, seq, result);
            guard.settled = true;
        }));
        true
    }

    fn settle(shared: &Shared<T>, epoch: u64, seq: u64, result: Result<T>) {
        let state = &shared.state;
        if !state.is_current(epoch) {
            // Stopped or restarted since dispatch; the in-flight flag now
            // belongs to the newer epoch.
            state.record_discard();
            return;
        }

        match result {
            Ok(value) => {
                state.apply(seq, value);
            }
            Err(e) => {
                state.record_failure();
                tracing::warn!(seq, "Poll fetch failed, keeping last result: {}", e);
            }
        }
        state.finish();
    }
}

impl<T> Default for PollingScheduler<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for PollingScheduler<T> {
    fn drop(&mut self) {
        let handle = self.handle.get_mut().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            self.shared.halt();
            handle.shutdown.notify_one();
            handle.task.abort();
        }
    }
}
