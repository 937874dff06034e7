use super::{ProgressSnapshot, SessionId};
use crate::config::DEFAULT_TARGET_UNITS;
use crate::error::TrackerError;

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced,
    /// This tick reached 100%; reported once per session
    Completed,
    Ignored,
}

/// Converts wall-clock ticks into a bounded completion percentage
#[derive(Debug, Clone)]
pub struct ProgressAccumulator {
    session_id: SessionId,
    elapsed_units: u64,
    target_units: u64,
    completed: bool,
    last_synced_units: u64,
    ticked: bool,
}

impl ProgressAccumulator {
    /// `target` of `None` or zero falls back to [`DEFAULT_TARGET_UNITS`]
    pub fn new(session_id: SessionId, target: Option<u64>) -> Self {
        Self::with_default_target(session_id, target, DEFAULT_TARGET_UNITS)
    }

    pub fn with_default_target(session_id: SessionId, target: Option<u64>, fallback: u64) -> Self {
        let fallback = fallback.max(1);
        let target_units = match target {
            Some(units) if units > 0 => units,
            other => {
                let err = TrackerError::InvalidTarget(format!("{:?}", other));
                tracing::debug!(session = %session_id, "{}; using {} units", err, fallback);
                fallback
            }
        };

        Self {
            session_id,
            elapsed_units: 0,
            target_units,
            completed: false,
            last_synced_units: 0,
            ticked: false,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn elapsed_units(&self) -> u64 {
        self.elapsed_units
    }

    pub fn target_units(&self) -> u64 {
        self.target_units
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn last_synced_units(&self) -> u64 {
        self.last_synced_units
    }

    pub fn percent_complete(&self) -> u8 {
        percent_of(self.elapsed_units, self.target_units)
    }

    /// Seed progress from a previously saved percentage.
    ///
    /// Only valid before the first tick. The seeded value is treated as
    /// already synced since it came from the remote store.
    pub fn set_initial_progress(&mut self, percent: f64) -> Result<bool, TrackerError> {
        if self.ticked || self.completed {
            return Err(TrackerError::InvalidState(
                "initial progress must be set before the first tick".to_string(),
            ));
        }

        let percent = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
        let units = (percent / 100.0 * self.target_units as f64).round() as u64;
        self.elapsed_units = units.min(self.target_units);
        self.last_synced_units = self.elapsed_units;

        if self.percent_complete() >= 100 {
            self.completed = true;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.completed {
            return TickOutcome::Ignored;
        }

        self.ticked = true;
        self.elapsed_units += 1;

        if self.percent_complete() >= 100 {
            self.completed = true;
            TickOutcome::Completed
        } else {
            TickOutcome::Advanced
        }
    }

    /// Returns `true` only on the call that actually completes the session
    pub fn mark_complete(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.elapsed_units = self.target_units;
        self.completed = true;
        true
    }

    /// Record a successful flush of `units`; never moves backwards
    pub fn record_synced(&mut self, units: u64) {
        self.last_synced_units = self.last_synced_units.max(units);
    }

    pub fn needs_sync(&self) -> bool {
        self.elapsed_units != self.last_synced_units
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            session_id: self.session_id.clone(),
            elapsed_units: self.elapsed_units,
            target_units: self.target_units,
            percent: self.percent_complete(),
            completed: self.completed,
        }
    }
}

/// `min(100, round(100 * elapsed / target))`, rounding half up
pub fn percent_of(elapsed: u64, target: u64) -> u8 {
    if target == 0 {
        return 100;
    }
    let elapsed = elapsed as u128;
    let target = target as u128;
    let rounded = (200 * elapsed + target) / (2 * target);
    rounded.min(100) as u8
}
