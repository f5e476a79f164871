//! Heartbeat clock.
//!
//! Heartbeats are recorded as a coarse tick rather than wall-clock millis:
//! epoch milliseconds shifted right by [`HEARTBEAT_TICK_SHIFT`] bits, so one
//! tick is 1024 ms. CAS predicates compare ticks with exact equality, which
//! is why the precision is intentionally low and why a clock must never hand
//! out a tick smaller than one it already returned.

use crate::Timestamp;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Number of bits the millisecond clock is shifted by.
pub const HEARTBEAT_TICK_SHIFT: u32 = 10;

/// Quantized heartbeat counter stored in `host.last_pinged`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HeartbeatTick(i64);

impl HeartbeatTick {
    /// Tick zero, used for hosts that never pinged.
    pub const ZERO: HeartbeatTick = HeartbeatTick(0);

    /// Wrap a raw tick value as stored in the database.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Raw value for persistence.
    pub fn raw(self) -> i64 {
        self.0
    }

    /// Quantize epoch milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis >> HEARTBEAT_TICK_SHIFT)
    }

    /// Quantize a timestamp.
    pub fn from_timestamp(ts: Timestamp) -> Self {
        Self::from_millis(ts.timestamp_millis())
    }

    /// Start of the bucket this tick covers. Only for diagnostics.
    pub fn approx_timestamp(self) -> Timestamp {
        Utc.timestamp_millis_opt(self.0 << HEARTBEAT_TICK_SHIFT)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

impl fmt::Display for HeartbeatTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of time for the coordination core.
///
/// Injected everywhere instead of calling `Utc::now()` directly so tests can
/// drive heartbeats and timeouts deterministically.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> Timestamp;

    /// Current heartbeat tick. Never smaller than a previously returned tick.
    fn tick(&self) -> HeartbeatTick;

    /// Tick below which a heartbeat is older than `timeout`.
    fn stale_cutoff(&self, timeout: Duration) -> HeartbeatTick {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let cutoff = self
            .now()
            .checked_sub_signed(timeout)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        HeartbeatTick::from_timestamp(cutoff)
    }
}

/// Wall clock with a high-water mark so ticks are monotonically non-decreasing
/// even if the system clock steps backwards.
#[derive(Debug, Default)]
pub struct SystemClock {
    high_water: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn tick(&self) -> HeartbeatTick {
        let observed = HeartbeatTick::from_timestamp(Utc::now()).raw();
        let previous = self.high_water.fetch_max(observed, Ordering::AcqRel);
        HeartbeatTick::from_raw(previous.max(observed))
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Start the clock at the given instant.
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Move the clock forward. Moving backwards is ignored.
    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(delta, Ordering::AcqRel);
    }

    /// Jump to an absolute instant if it is later than the current one.
    pub fn set(&self, to: Timestamp) {
        self.millis.fetch_max(to.timestamp_millis(), Ordering::AcqRel);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Utc.timestamp_millis_opt(self.millis.load(Ordering::Acquire))
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn tick(&self) -> HeartbeatTick {
        HeartbeatTick::from_millis(self.millis.load(Ordering::Acquire))
    }
}
