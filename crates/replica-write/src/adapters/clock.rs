//! Clock implementations.

use crate::ports::Clock;
use parking_lot::Mutex;
use shared_types::Timestamp;
use std::time::{SystemTime, UNIX_EPOCH};

/// Hybrid logical clock over the system wall clock. Readings never repeat
/// and never go backwards.
#[derive(Debug, Default)]
pub struct SystemClock {
    max_offset_nanos: u64,
    last: Mutex<Timestamp>,
}

impl SystemClock {
    pub fn new(max_offset_nanos: u64) -> Self {
        Self {
            max_offset_nanos,
            last: Mutex::new(Timestamp::ZERO),
        }
    }

    fn physical_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let mut last = self.last.lock();
        let physical = Timestamp::new(Self::physical_now(), 0);
        *last = if physical > *last { physical } else { last.next() };
        *last
    }

    fn max_offset_nanos(&self) -> u64 {
        self.max_offset_nanos
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
    max_offset_nanos: u64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
            max_offset_nanos: 0,
        }
    }

    pub fn with_max_offset(mut self, max_offset_nanos: u64) -> Self {
        self.max_offset_nanos = max_offset_nanos;
        self
    }

    pub fn set(&self, ts: Timestamp) {
        self.now.lock().forward(ts);
    }

    pub fn advance(&self, wall_nanos: u64) {
        let mut now = self.now.lock();
        *now = now.add(wall_nanos, 0);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }

    fn max_offset_nanos(&self) -> u64 {
        self.max_offset_nanos
    }
}
