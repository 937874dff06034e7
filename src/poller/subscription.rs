use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

/// Counters describing a subscription's history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub dispatched: u64,
    pub skipped: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub discarded: u64,
}

/// Shared state of one poll subscription
pub(crate) struct PollSubscription<T> {
    pub(crate) in_flight: AtomicBool,
    pub(crate) running: AtomicBool,
    /// Bumped on every start/stop; results from an older epoch are dropped
    pub(crate) epoch: AtomicU64,
    next_seq: AtomicU64,
    /// Sequence number of the dispatch whose result is currently shown
    applied_seq: Mutex<u64>,
    last_result: watch::Sender<Option<T>>,
    dispatched: AtomicU64,
    skipped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl<T> PollSubscription<T> {
    pub(crate) fn new() -> Self {
        let (last_result, _) = watch::channel(None);
        Self {
            in_flight: AtomicBool::new(false),
            running: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            next_seq: AtomicU64::new(0),
            applied_seq: Mutex::new(0),
            last_result,
            dispatched: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Claim the in-flight slot. Returns the dispatch sequence number, or
    /// `None` if a fetch is already outstanding.
    pub(crate) fn try_begin(&self) -> Option<u64> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        Some(self.next_seq.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.running.load(Ordering::Acquire) && self.epoch.load(Ordering::Acquire) == epoch
    }

    /// Store `value` unless a later dispatch has already been applied
    pub(crate) fn apply(&self, seq: u64, value: T) -> bool {
        let mut applied = self.applied_seq.lock().unwrap_or_else(|e| e.into_inner());
        if seq <= *applied {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        *applied = seq;
        self.last_result.send_replace(Some(value));
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discard(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn finish(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.last_result.subscribe()
    }

    pub(crate) fn last_result(&self) -> Option<T>
    where
        T: Clone,
    {
        self.last_result.borrow().clone()
    }

    pub(crate) fn stats(&self) -> PollStats {
        PollStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_is_skipped_while_in_flight() {
        let sub: PollSubscription<u32> = PollSubscription::new();
        assert_eq!(sub.try_begin(), Some(1));
        assert_eq!(sub.try_begin(), None);
        sub.finish();
        assert_eq!(sub.try_begin(), Some(2));

        let stats = sub.stats();
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_later_dispatch_wins() {
        let sub: PollSubscription<&str> = PollSubscription::new();
        assert!(sub.apply(2, "newer"));
        assert!(!sub.apply(1, "older"));
        assert_eq!(sub.last_result(), Some("newer"));
        assert_eq!(sub.stats().discarded, 1);
    }
}
