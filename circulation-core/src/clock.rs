//! Injectable clock collaborator
//!
//! Every timestamp the engine writes comes through [`Clock`], so tests can
//! pin or advance time deterministically with [`ManualClock`].

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Source of the current timestamp
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock pinned at the given instant
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: RwLock::new(now) }
    }

    /// Move the clock to an absolute instant
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    /// Advance the clock by a duration
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
