//! Send side of a probe

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{elapsed_since, Clock, SystemClock};
use crate::config::ProbeConfig;
use crate::envelope;
use crate::error::{MailflowError, Result};
use crate::monitoring::{MonitoringRecord, TransactionStatus};
use crate::transport::{ProbeMessage, Sender};
use crate::utils::{validate_email, validate_recipients};

/// Who a probe goes from and to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub from: String,
    pub recipients: Vec<String>,
    /// Generated when absent or nil
    pub correlation_id: Option<Uuid>,
}

impl ProbeRequest {
    pub fn new<I, S>(from: impl Into<String>, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            from: from.into(),
            recipients: recipients.into_iter().map(Into::into).collect(),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Request built from the configured sender and recipients
    pub fn from_config(config: &ProbeConfig) -> Result<Self> {
        let from = config
            .sender
            .clone()
            .ok_or_else(|| MailflowError::Config("probe.sender is not set".to_string()))?;

        Ok(Self::new(from, config.recipients.iter().cloned()))
    }

    fn validate(&self) -> Result<()> {
        validate_email(&self.from)?;
        validate_recipients(&self.recipients)
    }
}

/// Stamps, encodes and submits probes
pub struct Dispatcher {
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Send one probe through `sender`
    ///
    /// The returned record carries the send time, the send protocol and how
    /// long the submission took. Its correlation id is what the receiving
    /// side polls for.
    pub async fn send_probe<S>(&self, sender: &S, request: &ProbeRequest) -> Result<MonitoringRecord>
    where
        S: Sender + ?Sized,
    {
        request.validate()?;

        let correlation_id = request
            .correlation_id
            .filter(|id| !id.is_nil())
            .unwrap_or_else(Uuid::new_v4);

        let mut record = MonitoringRecord::new(correlation_id);
        record.set_sending_information(self.clock.now(), sender.protocol());

        let body = envelope::encode(&record)?;

        let message = ProbeMessage {
            from: request.from.clone(),
            recipients: request.recipients.clone(),
            subject: correlation_id.to_string(),
            body,
        };

        debug!(
            "Sending probe {} via {} to {} recipient(s)",
            correlation_id,
            sender.protocol(),
            message.recipients.len()
        );

        let started = self.clock.now();
        sender.send(&message).await?;
        record.set_duration(elapsed_since(self.clock.as_ref(), started));

        record.complete(TransactionStatus::Success)?;
        info!("{}", record);
        Ok(record)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
