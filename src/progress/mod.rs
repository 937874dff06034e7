pub mod accumulator;

pub use accumulator::{percent_of, ProgressAccumulator, TickOutcome};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of the resource or conversation being tracked
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only view of a session's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub session_id: SessionId,
    pub elapsed_units: u64,
    pub target_units: u64,
    pub percent: u8,
    pub completed: bool,
}

/// Lifecycle shared by the tracker components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Active,
    Completing,
    Completed,
    Disposed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Disposed)
    }

    /// Allowed lifecycle transitions; nothing leaves a terminal phase
    /// except `Completed -> Disposed`.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Active)
                | (Idle, Completing)
                | (Idle, Completed)
                | (Idle, Disposed)
                | (Active, Completing)
                | (Active, Disposed)
                | (Completing, Completed)
                | (Completing, Disposed)
                | (Completed, Disposed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_transition_back_to_active() {
        assert!(!SessionPhase::Completed.can_transition_to(SessionPhase::Active));
        assert!(!SessionPhase::Disposed.can_transition_to(SessionPhase::Active));
        assert!(!SessionPhase::Disposed.can_transition_to(SessionPhase::Completed));
    }

    #[test]
    fn test_teardown_reachable_from_active_and_completed() {
        assert!(SessionPhase::Active.can_transition_to(SessionPhase::Disposed));
        assert!(SessionPhase::Completed.can_transition_to(SessionPhase::Disposed));
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = ProgressSnapshot {
            session_id: SessionId::from("video-7"),
            elapsed_units: 30,
            target_units: 600,
            percent: 5,
            completed: false,
        };

        let serialized = serde_json::to_string(&snapshot).expect("Failed to serialize");
        assert!(serialized.contains("\"session_id\":\"video-7\""));
        assert!(serialized.contains("\"percent\":5"));
    }
}
