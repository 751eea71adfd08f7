//! Time Source
//!
//! Phase gating only ever compares whole seconds, so time is a plain
//! `u32` seconds-since-epoch value. The clock is a trait so tests and
//! the demo can drive it by hand.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A point in time with one second resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimePointSec(pub u32);

impl TimePointSec {
    /// Create from seconds since the Unix epoch.
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    /// Seconds since the Unix epoch.
    pub const fn secs(self) -> u32 {
        self.0
    }

    /// Seconds elapsed since `earlier` (zero if `earlier` is in the future).
    #[inline]
    pub fn elapsed_since(self, earlier: TimePointSec) -> u32 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for TimePointSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp(i64::from(self.0), 0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            None => write!(f, "{}s", self.0),
        }
    }
}

/// Source of the current time.
pub trait Clock {
    /// Current time.
    fn now(&self) -> TimePointSec;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimePointSec {
        let secs = chrono::Utc::now().timestamp();
        TimePointSec(u32::try_from(secs.max(0)).unwrap_or(u32::MAX))
    }
}

/// Hand-driven clock. Clones share the same underlying time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    secs: Arc<AtomicU32>,
}

impl ManualClock {
    /// Create a clock starting at `start`.
    pub fn new(start: TimePointSec) -> Self {
        Self {
            secs: Arc::new(AtomicU32::new(start.0)),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, time: TimePointSec) {
        self.secs.store(time.0, Ordering::SeqCst);
    }

    /// Move forward by `secs` seconds.
    pub fn advance(&self, secs: u32) {
        let now = self.secs.load(Ordering::SeqCst);
        self.secs.store(now.saturating_add(secs), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimePointSec {
        TimePointSec(self.secs.load(Ordering::SeqCst))
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> TimePointSec {
        (**self).now()
    }
}
