//! Time source for lifecycle decisions.
//!
//! Every date predicate (trial expiry, renewal due, settlement due) is
//! evaluated against a [`Clock`] rather than `Utc::now()` directly, so sweeps
//! can be replayed at a fixed instant.

use crate::{Result, SubscriptionError};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock.
///
/// Clones share the same instant, so a test can hold one handle and advance
/// time underneath a running service.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = instant;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `from` plus whole `days`, or `InvalidArgument` past the end of the
/// representable calendar.
pub(crate) fn days_after(from: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>> {
    from.checked_add_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| {
            SubscriptionError::InvalidArgument(format!(
                "{} days after {} is out of range",
                days, from
            ))
        })
}
