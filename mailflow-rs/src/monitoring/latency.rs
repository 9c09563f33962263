//! Latency arithmetic
//!
//! Sender and receiver clocks are not assumed to agree, so round-trip
//! latency is taken as an absolute value. Per-hop delays come from the
//! same host chain and are clamped at zero instead.

use chrono::{DateTime, Utc};
use std::time::Duration;

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Absolute distance between two instants in milliseconds, rounded up
pub fn latency_ms(a: DateTime<Utc>, b: DateTime<Utc>) -> u64 {
    let delta = if a >= b { a - b } else { b - a };

    match delta.num_nanoseconds() {
        Some(nanos) => (nanos as u64).div_ceil(NANOS_PER_MILLI),
        // More than ~292 years apart
        None => delta.num_milliseconds() as u64,
    }
}

/// Time elapsed between two consecutive hops
///
/// Zero when either timestamp is unknown or the hops are out of order.
pub fn hop_delay(previous: Option<DateTime<Utc>>, current: Option<DateTime<Utc>>) -> Duration {
    match (previous, current) {
        (Some(previous), Some(current)) => (current - previous).to_std().unwrap_or_default(),
        _ => Duration::ZERO,
    }
}
