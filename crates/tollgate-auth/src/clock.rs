//! Time source used for token lifetimes and grant expiry.

use std::sync::RwLock;

use time::{Duration, OffsetDateTime};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to. Used by tests and tooling that need
/// deterministic lifetimes.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<OffsetDateTime>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: OffsetDateTime) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}
