//! Transport trace header parsing
//!
//! This module turns the `Received:` trace headers of a delivered probe
//! into the chronological list of relays it went through.

pub mod parser;
pub mod types;

pub use parser::{parse_trace_headers, TraceHeaderParser};
pub use types::{HeaderParse, ParseDiagnostic};
