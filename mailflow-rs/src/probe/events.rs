//! Poll state transitions as structured events

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Emitted by the poller at each transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PollEvent {
    AttemptStarted {
        correlation_id: Uuid,
        attempt: u32,
        elapsed_ms: u64,
    },
    /// Subject matched but the body could not be used
    CandidateRejected {
        correlation_id: Uuid,
        candidate_id: String,
        reason: String,
    },
    CandidateMatched {
        correlation_id: Uuid,
        attempt: u32,
        fetch_duration_ms: u64,
    },
    TimedOut {
        correlation_id: Uuid,
        attempts: u32,
        elapsed_ms: u64,
    },
    Cancelled {
        correlation_id: Uuid,
        attempts: u32,
    },
}

/// Consumer of poll events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PollEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &PollEvent) {
        match event {
            PollEvent::AttemptStarted {
                correlation_id,
                attempt,
                elapsed_ms,
            } => debug!(%correlation_id, attempt, elapsed_ms, "Fetching candidates"),
            PollEvent::CandidateRejected {
                correlation_id,
                candidate_id,
                reason,
            } => warn!(%correlation_id, %candidate_id, %reason, "Skipping candidate"),
            PollEvent::CandidateMatched {
                correlation_id,
                attempt,
                fetch_duration_ms,
            } => info!(%correlation_id, attempt, fetch_duration_ms, "Probe message found"),
            PollEvent::TimedOut {
                correlation_id,
                attempts,
                elapsed_ms,
            } => warn!(%correlation_id, attempts, elapsed_ms, "Probe message not found before timeout"),
            PollEvent::Cancelled {
                correlation_id,
                attempts,
            } => info!(%correlation_id, attempts, "Polling cancelled"),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<PollEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PollEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of fetch attempts seen so far
    pub fn attempts(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, PollEvent::AttemptStarted { .. }))
            .count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &PollEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        let correlation_id = Uuid::new_v4();

        sink.emit(&PollEvent::AttemptStarted {
            correlation_id,
            attempt: 1,
            elapsed_ms: 0,
        });
        sink.emit(&PollEvent::TimedOut {
            correlation_id,
            attempts: 1,
            elapsed_ms: 10_000,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(sink.attempts(), 1);
        assert!(matches!(events[1], PollEvent::TimedOut { attempts: 1, .. }));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = PollEvent::Cancelled {
            correlation_id: Uuid::nil(),
            attempts: 3,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "cancelled");
        assert_eq!(json["attempts"], 3);
    }
}
