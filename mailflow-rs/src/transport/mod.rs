//! Transport seams
//!
//! Protocol clients (SMTP, POP, IMAP, EWS, Graph) live outside this crate.
//! They plug in through two capabilities:
//! - [`Sender`]: submits a [`ProbeMessage`]
//! - [`Receiver`]: lists [`Candidate`] messages and consumes the matched one
//!
//! [`MemoryMailbox`] implements both over an in-process mailbox.

pub mod memory;
pub mod types;

pub use memory::MemoryMailbox;
pub use types::{Candidate, CandidateFilter, ProbeMessage};

use crate::error::Result;
use crate::monitoring::Protocol;
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

/// Outbound half of a transport
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Sender: Send + Sync {
    /// Protocol stamped into the envelope
    fn protocol(&self) -> Protocol;

    /// Submit the message to every recipient
    async fn send(&self, message: &ProbeMessage) -> Result<()>;
}

/// Inbound half of a transport
///
/// Errors are returned as [`MailflowError::Transport`](crate::error::MailflowError::Transport)
/// and are not retried by callers.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Receiver: Send {
    fn protocol(&self) -> Protocol;

    /// Messages currently in the mailbox that pass the filter
    async fn list_candidates(&mut self, filter: &CandidateFilter) -> Result<Vec<Candidate>>;

    /// Delete a message previously returned by `list_candidates`
    async fn consume(&mut self, candidate: &Candidate) -> Result<()>;
}
