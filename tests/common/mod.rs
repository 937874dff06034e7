#![allow(dead_code)]

use async_trait::async_trait;
use session_tracker::error::Result;
use session_tracker::{ProgressStore, ProgressUpdate, TrackerError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

/// Store that records every write, optionally failing or holding writes
/// until released
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<ProgressUpdate>>,
    fail: AtomicBool,
    gate: Option<Semaphore>,
}

impl RecordingStore {
    /// Writes block until `release` is called
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Default::default()
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> Vec<ProgressUpdate> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressStore for RecordingStore {
    async fn save_progress(&self, update: &ProgressUpdate) -> Result<()> {
        self.calls.lock().unwrap().push(update.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TrackerError::FetchFailure("backend unavailable".to_string()));
        }
        Ok(())
    }
}
