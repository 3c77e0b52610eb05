//! Capture-time source for history entries.

use chrono::{DateTime, Utc};

/// Supplies the instant a snapshot is captured at.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
