//! Receive side of a probe: wait for the tagged message
//!
//! ```text
//!            ┌──────── no match, sleep(interval) ────────┐
//!            ↓                                           │
//! [Waiting] ─┴→ fetch candidates → match token? ── no ───┘
//!     │                                 │ yes
//!     │ elapsed ≥ timeout               ↓
//!     ↓                   decode, parse headers, consume
//! [TimedOut] → Failure                  ↓
//!                                    [Found] → Success
//! ```
//!
//! The timeout is checked once per iteration, so the wait may overshoot it
//! by up to one interval.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::events::{EventSink, PollEvent, TracingSink};
use crate::clock::{elapsed_since, Clock, SystemClock};
use crate::config::ProbeConfig;
use crate::envelope;
use crate::error::{MailflowError, Result};
use crate::headers::TraceHeaderParser;
use crate::monitoring::{MonitoringRecord, Protocol, TransactionStatus};
use crate::transport::{Candidate, CandidateFilter, Receiver};

/// How long to wait for a probe and how often to look
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    timeout: Duration,
    interval: Duration,
}

impl PollSettings {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new(timeout: Duration, interval: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(MailflowError::Validation(
                "Timeout cannot be zero".to_string(),
            ));
        }
        if interval.is_zero() {
            return Err(MailflowError::Validation(
                "Sleep interval cannot be zero".to_string(),
            ));
        }

        Ok(Self { timeout, interval })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            interval: Self::DEFAULT_INTERVAL,
        }
    }
}

enum PollState {
    Waiting { attempt: u32 },
    Found(Box<MonitoringRecord>),
    TimedOut { attempts: u32 },
}

/// Bounded retry loop against a [`Receiver`]
pub struct Poller {
    settings: PollSettings,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl Poller {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            settings,
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Result<Self> {
        Ok(Self::new(config.poll_settings()?))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Wait for the message tagged with `token`
    ///
    /// Returns a `Success` record when found, a `Failure` record on timeout.
    /// An invalid token fails before any fetch; receiver errors abort the poll.
    pub async fn poll<R>(&self, receiver: &mut R, token: &str) -> Result<MonitoringRecord>
    where
        R: Receiver + ?Sized,
    {
        self.poll_with_cancel(receiver, token, &CancellationToken::new())
            .await
    }

    /// Same as [`poll`](Self::poll), giving up with [`MailflowError::Cancelled`]
    /// as soon as `cancel` fires
    pub async fn poll_with_cancel<R>(
        &self,
        receiver: &mut R,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<MonitoringRecord>
    where
        R: Receiver + ?Sized,
    {
        let correlation_id = parse_token(token)?;
        let filter = CandidateFilter::subject_contains(correlation_id.to_string());
        let started = self.clock.now();

        let mut state = PollState::Waiting { attempt: 1 };
        loop {
            state = match state {
                PollState::Waiting { attempt } => {
                    self.attempt(receiver, correlation_id, &filter, started, attempt, cancel)
                        .await?
                }
                PollState::Found(record) => {
                    info!("{}", record);
                    return Ok(*record);
                }
                PollState::TimedOut { attempts } => {
                    self.sink.emit(&PollEvent::TimedOut {
                        correlation_id,
                        attempts,
                        elapsed_ms: millis(elapsed_since(self.clock.as_ref(), started)),
                    });

                    let mut record = MonitoringRecord::new(correlation_id);
                    record.set_receive_protocol(receiver.protocol());
                    record.complete(TransactionStatus::Failure)?;
                    info!("{}", record);
                    return Ok(record);
                }
            };
        }
    }

    async fn attempt<R>(
        &self,
        receiver: &mut R,
        correlation_id: Uuid,
        filter: &CandidateFilter,
        started: chrono::DateTime<chrono::Utc>,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<PollState>
    where
        R: Receiver + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(self.cancelled(correlation_id, attempt - 1));
        }

        let elapsed = elapsed_since(self.clock.as_ref(), started);
        if elapsed >= self.settings.timeout {
            return Ok(PollState::TimedOut {
                attempts: attempt - 1,
            });
        }

        self.sink.emit(&PollEvent::AttemptStarted {
            correlation_id,
            attempt,
            elapsed_ms: millis(elapsed),
        });

        let fetch_started = self.clock.now();
        let candidates = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.cancelled(correlation_id, attempt)),
            fetched = receiver.list_candidates(filter) => fetched?,
        };
        let fetch_duration = elapsed_since(self.clock.as_ref(), fetch_started);

        for candidate in &candidates {
            if !subject_matches(&candidate.subject, correlation_id) {
                continue;
            }

            match self.accept(correlation_id, candidate, fetch_duration, receiver.protocol()) {
                Ok(record) => {
                    receiver.consume(candidate).await?;
                    self.sink.emit(&PollEvent::CandidateMatched {
                        correlation_id,
                        attempt,
                        fetch_duration_ms: millis(fetch_duration),
                    });
                    return Ok(PollState::Found(Box::new(record)));
                }
                Err(e) => self.sink.emit(&PollEvent::CandidateRejected {
                    correlation_id,
                    candidate_id: candidate.id.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.cancelled(correlation_id, attempt)),
            _ = self.clock.sleep(self.settings.interval) => {}
        }

        Ok(PollState::Waiting {
            attempt: attempt + 1,
        })
    }

    /// Build the finished record for a candidate whose subject matched
    fn accept(
        &self,
        correlation_id: Uuid,
        candidate: &Candidate,
        fetch_duration: Duration,
        protocol: Protocol,
    ) -> Result<MonitoringRecord> {
        let envelope = envelope::decode(candidate.body.as_bytes())?;

        let mut record = MonitoringRecord::new(correlation_id);
        record.merge_envelope(&envelope)?;
        record.set_receiving_information(candidate.received_at, protocol);
        record.set_duration(fetch_duration);

        let parsed = TraceHeaderParser::parse(&candidate.trace_headers);
        for diagnostic in &parsed.diagnostics {
            debug!(%correlation_id, "Trace headers: {}", diagnostic);
        }
        record.set_hops(parsed.hops);

        record.compute_latency();
        record.complete(TransactionStatus::Success)?;
        Ok(record)
    }

    fn cancelled(&self, correlation_id: Uuid, attempt: u32) -> MailflowError {
        self.sink.emit(&PollEvent::Cancelled {
            correlation_id,
            attempts: attempt,
        });
        MailflowError::Cancelled
    }
}

/// A correlation token must be a non-nil UUID
fn parse_token(token: &str) -> Result<Uuid> {
    let token = token.trim();
    if token.is_empty() {
        return Err(MailflowError::Validation(
            "Correlation token cannot be empty".to_string(),
        ));
    }

    let correlation_id = Uuid::parse_str(token).map_err(|e| {
        MailflowError::Validation(format!("Invalid correlation token <{}>: {}", token, e))
    })?;

    if correlation_id.is_nil() {
        return Err(MailflowError::Validation(
            "Correlation token cannot be the nil UUID".to_string(),
        ));
    }

    Ok(correlation_id)
}

fn subject_matches(subject: &str, correlation_id: Uuid) -> bool {
    subject
        .to_ascii_lowercase()
        .contains(&correlation_id.to_string())
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::monitoring::Protocol;
    use crate::probe::events::MemorySink;
    use crate::transport::MockReceiver;
    use chrono::{TimeZone, Utc};

    fn manual_poller(timeout: u64, interval: u64) -> (Poller, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        ));
        let settings =
            PollSettings::new(Duration::from_secs(timeout), Duration::from_secs(interval))
                .unwrap();

        let poller = Poller::new(settings).with_clock(clock).with_sink(sink.clone());
        (poller, sink)
    }

    #[test]
    fn test_settings_reject_zero() {
        assert!(PollSettings::new(Duration::ZERO, Duration::from_secs(5)).is_err());
        assert!(PollSettings::new(Duration::from_secs(5), Duration::ZERO).is_err());

        let defaults = PollSettings::default();
        assert_eq!(defaults.timeout(), Duration::from_secs(300));
        assert_eq!(defaults.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_token() {
        let id = Uuid::new_v4();
        assert_eq!(parse_token(&id.to_string()).unwrap(), id);
        assert_eq!(parse_token(&id.to_string().to_uppercase()).unwrap(), id);

        for bad in ["", "   ", "not-a-guid", "00000000-0000-0000-0000-000000000000"] {
            assert!(matches!(parse_token(bad), Err(MailflowError::Validation(_))));
        }
    }

    #[test]
    fn test_subject_matches_ignores_case() {
        let id = Uuid::new_v4();
        assert!(subject_matches(&id.to_string().to_uppercase(), id));
        assert!(subject_matches(&format!("Probe: {}", id), id));
        assert!(!subject_matches("Probe", id));
    }

    #[tokio::test]
    async fn test_invalid_token_fails_before_fetch() {
        let (poller, sink) = manual_poller(10, 5);
        let mut receiver = MockReceiver::new();
        receiver.expect_list_candidates().never();

        let result = poller.poll(&mut receiver, "").await;

        assert!(matches!(result, Err(MailflowError::Validation(_))));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_after_two_attempts() {
        let (poller, sink) = manual_poller(10, 5);
        let mut receiver = MockReceiver::new();
        receiver
            .expect_list_candidates()
            .times(2)
            .returning(|_| Ok(Vec::new()));
        receiver.expect_protocol().return_const(Protocol::Pop);
        receiver.expect_consume().never();

        let token = Uuid::new_v4();
        let record = poller.poll(&mut receiver, &token.to_string()).await.unwrap();

        assert_eq!(record.status(), TransactionStatus::Failure);
        assert_eq!(record.correlation_id(), token);
        assert_eq!(record.receive_protocol(), Protocol::Pop);
        assert!(record.hops().is_empty());
        assert!(record.latency_ms().is_none());
        assert!(record.duration_ms().is_none());
        assert!(record.sent_at().is_none());

        assert_eq!(sink.attempts(), 2);
        assert!(matches!(
            sink.events().last(),
            Some(PollEvent::TimedOut { attempts: 2, elapsed_ms: 10_000, .. })
        ));
    }

    #[tokio::test]
    async fn test_transport_error_aborts() {
        let (poller, _sink) = manual_poller(10, 5);
        let mut receiver = MockReceiver::new();
        receiver
            .expect_list_candidates()
            .times(1)
            .returning(|_| Err(MailflowError::transport(Protocol::Imap, "connection reset")));

        let result = poller.poll(&mut receiver, &Uuid::new_v4().to_string()).await;

        assert!(matches!(
            result,
            Err(MailflowError::Transport { protocol: Protocol::Imap, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let (poller, sink) = manual_poller(10, 5);
        let mut receiver = MockReceiver::new();
        receiver.expect_list_candidates().never();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = poller
            .poll_with_cancel(&mut receiver, &Uuid::new_v4().to_string(), &cancel)
            .await;

        assert!(matches!(result, Err(MailflowError::Cancelled)));
        assert!(matches!(
            sink.events().last(),
            Some(PollEvent::Cancelled { attempts: 0, .. })
        ));
    }
}
