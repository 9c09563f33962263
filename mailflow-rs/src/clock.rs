//! Time source for probes
//!
//! Polling measures elapsed time and sleeps through a [`Clock`] so tests can
//! run a five minute timeout in no time with [`ManualClock`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Upper bound used when a std duration does not fit a chrono one
const MAX_CHRONO_DAYS: i64 = 36_500;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the current task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Wall clock and tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: time only moves through `advance` or `sleep`
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = *now + to_chrono(duration);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Time between `since` and now on `clock`, zero if the clock went backwards
pub fn elapsed_since(clock: &dyn Clock, since: DateTime<Utc>) -> Duration {
    (clock.now() - since).to_std().unwrap_or_default()
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration)
        .unwrap_or_else(|_| chrono::Duration::days(MAX_CHRONO_DAYS))
}
