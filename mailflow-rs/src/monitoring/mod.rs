//! Monitoring records
//!
//! The data threaded through a probe: send side stamps it, the transport
//! carries the envelope, the poller finishes it on the receiving side.

pub mod latency;
pub mod types;

pub use latency::{hop_delay, latency_ms};
pub use types::{HopRecord, MonitoringRecord, OperationRecord, Protocol, TransactionStatus};
