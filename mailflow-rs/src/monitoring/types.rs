//! Monitoring record types

use crate::envelope::Envelope;
use crate::error::{MailflowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::latency::latency_ms;

const SUMMARY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Transport a probe was sent or received through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "ProtocolRepr")]
pub enum Protocol {
    #[default]
    None,
    Smtp,
    Pop,
    Imap,
    Ews,
    Graph,
}

impl Protocol {
    /// Declaration order, which is also the numeric wire index
    pub const ALL: [Protocol; 6] = [
        Protocol::None,
        Protocol::Smtp,
        Protocol::Pop,
        Protocol::Imap,
        Protocol::Ews,
        Protocol::Graph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::None => "None",
            Protocol::Smtp => "SMTP",
            Protocol::Pop => "POP",
            Protocol::Imap => "IMAP",
            Protocol::Ews => "EWS",
            Protocol::Graph => "GRAPH",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = MailflowError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Protocol::ALL
            .into_iter()
            .find(|protocol| protocol.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| MailflowError::Decode(format!("Unknown protocol: {}", s)))
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Older probes wrote the protocol as its numeric index
#[derive(Deserialize)]
#[serde(untagged)]
enum ProtocolRepr {
    Name(String),
    Index(u64),
}

impl TryFrom<ProtocolRepr> for Protocol {
    type Error = MailflowError;

    fn try_from(repr: ProtocolRepr) -> Result<Self> {
        match repr {
            ProtocolRepr::Name(name) => name.parse(),
            ProtocolRepr::Index(index) => usize::try_from(index)
                .ok()
                .and_then(|i| Protocol::ALL.get(i).copied())
                .ok_or_else(|| MailflowError::Decode(format!("Unknown protocol index: {}", index))),
        }
    }
}

/// Outcome of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[default]
    Pending,
    Success,
    Failure,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Success => "Success",
            TransactionStatus::Failure => "Failure",
        };
        f.write_str(name)
    }
}

/// One relay recorded in a message's trace headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopRecord {
    /// 1-based position, oldest hop first
    pub hop_index: u32,
    /// Host that handed the message over
    pub submitting_host: String,
    /// Host that accepted the message
    pub receiving_host: String,
    /// Normalized transfer protocol (SMTP, ESMTP or the raw clause)
    pub transport_type: String,
    /// When the receiving host stamped the message (None if unparseable)
    pub received_at: Option<DateTime<Utc>>,
    /// Time since the previous hop in milliseconds
    pub delay_ms: u64,
}

impl HopRecord {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl fmt::Display for HopRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let received = self
            .received_at
            .map(|at| at.format(SUMMARY_TIME_FORMAT).to_string())
            .unwrap_or_else(|| "unknown".to_string());

        write!(
            f,
            "Hop <{}> from <{}> to <{}> via <{}> on <{}> took <{}> seconds.",
            self.hop_index,
            self.submitting_host,
            self.receiving_host,
            self.transport_type,
            received,
            self.delay().as_secs_f64()
        )
    }
}

/// Result of one synthetic mail-flow round trip
///
/// The correlation id is fixed at construction. Status leaves `Pending`
/// exactly once, towards `Success` or `Failure`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringRecord {
    correlation_id: Uuid,
    sent_at: Option<DateTime<Utc>>,
    send_protocol: Protocol,
    received_at: Option<DateTime<Utc>>,
    receive_protocol: Protocol,
    latency_ms: Option<u64>,
    duration_ms: Option<u64>,
    status: TransactionStatus,
    hops: Vec<HopRecord>,
}

impl MonitoringRecord {
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            sent_at: None,
            send_protocol: Protocol::None,
            received_at: None,
            receive_protocol: Protocol::None,
            latency_ms: None,
            duration_ms: None,
            status: TransactionStatus::Pending,
            hops: Vec::new(),
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn send_protocol(&self) -> Protocol {
        self.send_protocol
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn receive_protocol(&self) -> Protocol {
        self.receive_protocol
    }

    /// Round-trip latency, only set once the probe was found
    pub fn latency_ms(&self) -> Option<u64> {
        self.latency_ms
    }

    /// Cost of the send call or of the fetch that found the probe
    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    pub fn hops(&self) -> &[HopRecord] {
        &self.hops
    }

    pub fn set_sending_information(&mut self, sent_at: DateTime<Utc>, protocol: Protocol) {
        self.sent_at = Some(sent_at);
        self.send_protocol = protocol;
    }

    pub fn set_receiving_information(&mut self, received_at: DateTime<Utc>, protocol: Protocol) {
        self.received_at = Some(received_at);
        self.receive_protocol = protocol;
    }

    pub fn set_receive_protocol(&mut self, protocol: Protocol) {
        self.receive_protocol = protocol;
    }

    /// Take the send-side fields carried by a decoded envelope
    pub fn merge_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        if envelope.correlation_id != self.correlation_id {
            return Err(MailflowError::Decode(format!(
                "Envelope belongs to {} instead of {}",
                envelope.correlation_id, self.correlation_id
            )));
        }

        self.set_sending_information(envelope.sent_at, envelope.sending_protocol);
        Ok(())
    }

    /// Send-side view of this record, if it was stamped
    pub fn envelope(&self) -> Option<Envelope> {
        self.sent_at.map(|sent_at| Envelope {
            correlation_id: self.correlation_id,
            sent_at,
            sending_protocol: self.send_protocol,
        })
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_ms = Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
    }

    pub fn set_hops(&mut self, hops: Vec<HopRecord>) {
        self.hops = hops;
    }

    /// Derive latency from the send and receive timestamps
    pub fn compute_latency(&mut self) -> Option<u64> {
        if let (Some(sent), Some(received)) = (self.sent_at, self.received_at) {
            self.latency_ms = Some(latency_ms(received, sent));
        }
        self.latency_ms
    }

    /// Move out of `Pending` into a terminal status
    pub fn complete(&mut self, status: TransactionStatus) -> Result<()> {
        if self.status != TransactionStatus::Pending || status == TransactionStatus::Pending {
            return Err(MailflowError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }

        self.status = status;
        Ok(())
    }
}

impl fmt::Display for MonitoringRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stamp = |at: Option<DateTime<Utc>>| {
            at.map(|at| at.format(SUMMARY_TIME_FORMAT).to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };
        let latency = self
            .latency_ms
            .map(|ms| format!("{:.3}", ms as f64 / 1000.0))
            .unwrap_or_else(|| "n/a".to_string());
        let duration = self
            .duration_ms
            .map(|ms| ms.to_string())
            .unwrap_or_else(|| "n/a".to_string());

        write!(
            f,
            "Message <{}> sent via <{}> at <{}> and received via <{}> on <{}> took <{}> seconds. Operation took <{}> msec and status was <{}>.",
            self.correlation_id,
            self.send_protocol,
            stamp(self.sent_at),
            self.receive_protocol,
            stamp(self.received_at),
            latency,
            duration,
            self.status
        )?;

        for hop in &self.hops {
            write!(f, "\n{}", hop)?;
        }
        Ok(())
    }
}

/// Result of a mailbox operation that carries no round trip, such as a purge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: TransactionStatus,
    /// Number of messages the operation touched
    pub affected: usize,
}

impl fmt::Display for OperationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The operation executed on <{}> touched <{}> messages in <{}> msec and terminated with <{}>.",
            self.executed_at.format(SUMMARY_TIME_FORMAT),
            self.affected,
            self.duration_ms,
            self.status
        )
    }
}
