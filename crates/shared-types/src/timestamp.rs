//! # Hybrid Logical Clock Timestamps
//!
//! A timestamp is a wall-clock reading in nanoseconds paired with a logical
//! counter that orders events sharing the same wall time. Ordering is
//! lexicographic on `(wall_time, logical)`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A hybrid logical clock timestamp.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp {
    /// Physical component, nanoseconds since the Unix epoch.
    pub wall_time: u64,
    /// Logical component, disambiguates events at the same wall time.
    pub logical: u32,
}

impl Timestamp {
    /// The zero timestamp. Used as "unset".
    pub const ZERO: Timestamp = Timestamp {
        wall_time: 0,
        logical: 0,
    };

    pub const fn new(wall_time: u64, logical: u32) -> Self {
        Self { wall_time, logical }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::ZERO
    }

    /// The smallest timestamp strictly greater than `self`.
    pub fn next(&self) -> Timestamp {
        if self.logical == u32::MAX {
            Timestamp::new(self.wall_time + 1, 0)
        } else {
            Timestamp::new(self.wall_time, self.logical + 1)
        }
    }

    /// The largest timestamp strictly smaller than `self`.
    pub fn prev(&self) -> Timestamp {
        if self.logical > 0 {
            Timestamp::new(self.wall_time, self.logical - 1)
        } else if self.wall_time > 0 {
            Timestamp::new(self.wall_time - 1, u32::MAX)
        } else {
            Timestamp::ZERO
        }
    }

    /// Advance `self` to `other` if `other` is later. Returns whether `self`
    /// changed.
    pub fn forward(&mut self, other: Timestamp) -> bool {
        if *self < other {
            *self = other;
            true
        } else {
            false
        }
    }

    /// Lower `self` to `other` if `other` is earlier.
    pub fn backward(&mut self, other: Timestamp) {
        if other < *self {
            *self = other;
        }
    }

    pub fn add(&self, wall_nanos: u64, logical: u32) -> Timestamp {
        Timestamp::new(
            self.wall_time.saturating_add(wall_nanos),
            self.logical.saturating_add(logical),
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:09},{}",
            self.wall_time / 1_000_000_000,
            self.wall_time % 1_000_000_000,
            self.logical
        )
    }
}
