//! mailflow-rs: Synthetic mail-flow monitoring
//!
//! Sends a tagged probe message through one transport, waits for it on
//! another, and reports how long the round trip took and which relays the
//! message crossed.
//!
//! # Features
//!
//! - **Envelope**: JSON body carrying the probe's correlation id, send time and protocol
//! - **Trace headers**: `Received` chains turned into ordered hops with per-hop delays
//! - **Polling**: bounded wait with a fixed interval, cancellable, observable through events
//! - **Transports**: protocol clients plug in through the [`transport::Sender`] and
//!   [`transport::Receiver`] traits
//!
//! # Example
//!
//! ```no_run
//! use mailflow_rs::probe::{Dispatcher, PollSettings, Poller, ProbeRequest};
//! use mailflow_rs::transport::MemoryMailbox;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut mailbox = MemoryMailbox::new();
//!
//!     let request = ProbeRequest::new("probe@example.com", ["monitor@example.org"]);
//!     let sent = Dispatcher::new().send_probe(&mailbox, &request).await?;
//!
//!     let poller = Poller::new(PollSettings::default());
//!     let received = poller
//!         .poll(&mut mailbox, &sent.correlation_id().to_string())
//!         .await?;
//!
//!     println!("{}", received);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`envelope`]: Probe body codec
//! - [`headers`]: Trace header parsing
//! - [`monitoring`]: Monitoring records and latency
//! - [`probe`]: Send, poll and purge
//! - [`transport`]: Sender/Receiver seams and the in-memory mailbox
//! - [`clock`]: Time source used by probes
//! - [`logging`]: Subscriber setup
//! - [`utils`]: Utility functions (validation, etc.)

pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod headers;
pub mod logging;
pub mod monitoring;
pub mod probe;
pub mod transport;
pub mod utils;

pub use envelope::Envelope;
pub use error::{MailflowError, Result};
pub use headers::{parse_trace_headers, TraceHeaderParser};
pub use monitoring::{HopRecord, MonitoringRecord, OperationRecord, Protocol, TransactionStatus};
