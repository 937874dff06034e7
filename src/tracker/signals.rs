use crate::progress::ProgressSnapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub type ProgressCallback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Outbound notifications for the owning view
#[derive(Default)]
pub(crate) struct Signals {
    on_progress: Mutex<Option<ProgressCallback>>,
    on_complete: Mutex<Option<ProgressCallback>>,
    completion_emitted: AtomicBool,
}

impl Signals {
    pub(crate) fn set_on_progress(&self, callback: ProgressCallback) {
        *self.on_progress.lock().unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    pub(crate) fn set_on_complete(&self, callback: ProgressCallback) {
        *self.on_complete.lock().unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    /// Callbacks are cloned out so they run without any lock held
    pub(crate) fn progress(&self, snapshot: &ProgressSnapshot) {
        let callback = self.on_progress.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(callback) = callback {
            callback(snapshot);
        }
    }

    pub(crate) fn complete(&self, snapshot: &ProgressSnapshot) {
        if self.completion_emitted.swap(true, Ordering::AcqRel) {
            return;
        }
        let callback = self.on_complete.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(callback) = callback {
            callback(snapshot);
        }
    }
}
