//! Probe lifecycle
//!
//! - [`dispatcher`]: stamps and sends a probe, returning the send-side record
//! - [`poller`]: waits for the probe on the receiving side
//! - [`purge`]: empties a probe mailbox
//! - [`events`]: structured events emitted while polling

pub mod dispatcher;
pub mod events;
pub mod poller;
pub mod purge;

pub use dispatcher::{Dispatcher, ProbeRequest};
pub use events::{EventSink, MemorySink, PollEvent, TracingSink};
pub use poller::{PollSettings, Poller};
pub use purge::purge_mailbox;
