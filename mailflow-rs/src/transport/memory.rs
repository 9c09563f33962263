//! In-process loopback mailbox
//!
//! Sending appends a message to a shared inbox, stamped with synthetic
//! `Received` headers for the configured relay chain. Receiving reads the
//! same inbox. Clones share the inbox, so one clone can act as the sender
//! while another is polled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::types::{Candidate, CandidateFilter, ProbeMessage};
use super::{Receiver, Sender};
use crate::clock::{to_chrono, Clock, SystemClock};
use crate::error::{MailflowError, Result};
use crate::monitoring::Protocol;

const TRACE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

#[derive(Clone)]
pub struct MemoryMailbox {
    inbox: Arc<Mutex<Vec<Candidate>>>,
    send_protocol: Protocol,
    receive_protocol: Protocol,
    relays: Vec<String>,
    relay_delay: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self {
            inbox: Arc::new(Mutex::new(Vec::new())),
            send_protocol: Protocol::Smtp,
            receive_protocol: Protocol::Imap,
            relays: Vec::new(),
            relay_delay: Duration::ZERO,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_protocols(mut self, send: Protocol, receive: Protocol) -> Self {
        self.send_protocol = send;
        self.receive_protocol = receive;
        self
    }

    /// Hosts the message travels through, first submitter to final mailbox
    /// server, each hop taking `delay`
    pub fn with_relays<I, S>(mut self, relays: I, delay: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relays = relays.into_iter().map(Into::into).collect();
        self.relay_delay = delay;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Drop a message straight into the inbox
    pub async fn deliver(&self, candidate: Candidate) {
        self.inbox.lock().await.push(candidate);
    }

    pub async fn len(&self) -> usize {
        self.inbox.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inbox.lock().await.is_empty()
    }

    /// Trace headers for the relay chain, newest entry first, and the
    /// time the last relay accepted the message
    fn stamp_relays(&self, submitted_at: DateTime<Utc>) -> (String, DateTime<Utc>) {
        let step = to_chrono(self.relay_delay);
        let mut lines = Vec::new();
        let mut stamped_at = submitted_at;

        for (hop, pair) in self.relays.windows(2).enumerate() {
            stamped_at = submitted_at + step * (hop as i32 + 1);
            let transport = if hop == 0 { "SMTP" } else { "ESMTP" };
            lines.push(format!(
                "Received: from {} by {} with {}; {}",
                pair[0],
                pair[1],
                transport,
                stamped_at.format(TRACE_DATE_FORMAT)
            ));
        }

        lines.reverse();
        (lines.join("\r\n"), stamped_at)
    }
}

impl Default for MemoryMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sender for MemoryMailbox {
    fn protocol(&self) -> Protocol {
        self.send_protocol
    }

    async fn send(&self, message: &ProbeMessage) -> Result<()> {
        let (trace_headers, received_at) = self.stamp_relays(self.clock.now());

        let candidate = Candidate {
            id: Uuid::new_v4().to_string(),
            subject: message.subject.clone(),
            body: message.body.clone(),
            trace_headers,
            received_at,
        };

        debug!(
            "Loopback delivery of <{}> to {} recipient(s)",
            candidate.subject,
            message.recipients.len()
        );
        self.deliver(candidate).await;
        Ok(())
    }
}

#[async_trait]
impl Receiver for MemoryMailbox {
    fn protocol(&self) -> Protocol {
        self.receive_protocol
    }

    async fn list_candidates(&mut self, filter: &CandidateFilter) -> Result<Vec<Candidate>> {
        let inbox = self.inbox.lock().await;
        Ok(inbox
            .iter()
            .filter(|candidate| filter.matches(&candidate.subject))
            .cloned()
            .collect())
    }

    async fn consume(&mut self, candidate: &Candidate) -> Result<()> {
        let mut inbox = self.inbox.lock().await;
        let position = inbox
            .iter()
            .position(|stored| stored.id == candidate.id)
            .ok_or_else(|| {
                MailflowError::transport(
                    self.receive_protocol,
                    format!("Message {} not found", candidate.id),
                )
            })?;

        inbox.remove(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::headers::TraceHeaderParser;
    use chrono::TimeZone;

    fn probe(subject: &str) -> ProbeMessage {
        ProbeMessage {
            from: "probe@example.com".to_string(),
            recipients: vec!["monitor@example.org".to_string()],
            subject: subject.to_string(),
            body: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_then_list() {
        let mut mailbox = MemoryMailbox::new();
        mailbox.send(&probe("first")).await.unwrap();
        mailbox.send(&probe("second")).await.unwrap();

        let all = mailbox.list_candidates(&CandidateFilter::all()).await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered = mailbox
            .list_candidates(&CandidateFilter::subject_contains("SECOND"))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].subject, "second");
    }

    #[tokio::test]
    async fn test_consume_removes_once() {
        let mut mailbox = MemoryMailbox::new();
        mailbox.send(&probe("only")).await.unwrap();

        let candidate = mailbox
            .list_candidates(&CandidateFilter::all())
            .await
            .unwrap()
            .remove(0);

        mailbox.consume(&candidate).await.unwrap();
        assert!(mailbox.is_empty().await);

        assert!(matches!(
            mailbox.consume(&candidate).await,
            Err(MailflowError::Transport { protocol: Protocol::Imap, .. })
        ));
    }

    #[tokio::test]
    async fn test_relay_headers_parse_back() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let mut mailbox = MemoryMailbox::new()
            .with_clock(Arc::new(ManualClock::new(start)))
            .with_relays(["client", "relay", "mx"], Duration::from_secs(2));

        mailbox.send(&probe("traced")).await.unwrap();
        let candidate = mailbox
            .list_candidates(&CandidateFilter::all())
            .await
            .unwrap()
            .remove(0);

        assert_eq!(candidate.received_at, start + chrono::Duration::seconds(4));

        let parse = TraceHeaderParser::parse(&candidate.trace_headers);
        assert_eq!(parse.hops.len(), 2);
        assert_eq!(parse.hops[0].submitting_host, "client");
        assert_eq!(parse.hops[0].transport_type, "SMTP");
        assert_eq!(parse.hops[1].receiving_host, "mx");
        assert_eq!(parse.hops[1].delay_ms, 2000);
    }
}
