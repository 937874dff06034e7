use crate::error::TrackerError;
use serde::{Deserialize, Serialize};

/// Saved progress as returned by `GET /progress/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressRecord {
    pub session_id: String,
    #[serde(default)]
    pub elapsed_units: u64,
    pub percent: f64,
    #[serde(default)]
    pub completed: bool,
}

impl ProgressRecord {
    /// Reject records the tracker must not trust
    pub fn validate(self) -> Result<Self, TrackerError> {
        if !self.percent.is_finite() || !(0.0..=100.0).contains(&self.percent) {
            return Err(TrackerError::InvalidResponse(format!(
                "percent out of range: {}",
                self.percent
            )));
        }
        if self.session_id.is_empty() {
            return Err(TrackerError::InvalidResponse("empty session_id".to_string()));
        }
        Ok(self)
    }

    /// Percentage to resume from; a completed record always resumes at 100
    pub fn resume_percent(&self) -> f64 {
        if self.completed {
            100.0
        } else {
            self.percent
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Teacher,
    Crp,
    Arp,
    Admin,
}

/// One message in a conversation between roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub body: String,
    pub sent_at: String,
    #[serde(default)]
    pub read: bool,
}

/// Envelope of `GET /conversations/{id}/messages`
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
}

/// Error body returned by the backend on non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(alias = "detail", alias = "error")]
    pub message: String,
}

pub fn unread_count(messages: &[Message]) -> usize {
    messages.iter().filter(|m| !m.read).count()
}
