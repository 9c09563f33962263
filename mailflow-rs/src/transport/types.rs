//! Messages exchanged with transports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outbound probe, as handed to a [`Sender`](super::Sender)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeMessage {
    pub from: String,
    pub recipients: Vec<String>,
    /// The correlation token
    pub subject: String,
    /// The encoded envelope
    pub body: String,
}

/// A message seen in the probe mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Transport-specific handle used to consume the message
    pub id: String,
    pub subject: String,
    /// Plain text body
    pub body: String,
    /// All trace header lines, newest first
    pub trace_headers: String,
    pub received_at: DateTime<Utc>,
}

/// What a receiver should list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Case-insensitive substring the subject must contain
    pub subject_contains: Option<String>,
}

impl CandidateFilter {
    /// Every message in the mailbox
    pub fn all() -> Self {
        Self::default()
    }

    pub fn subject_contains(needle: impl Into<String>) -> Self {
        Self {
            subject_contains: Some(needle.into()),
        }
    }

    pub fn matches(&self, subject: &str) -> bool {
        match &self.subject_contains {
            Some(needle) => subject
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            None => true,
        }
    }
}
