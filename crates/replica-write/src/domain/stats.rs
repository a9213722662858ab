//! MVCC statistics deltas.

use serde::{Deserialize, Serialize};

/// Change in the range's MVCC statistics produced by evaluating a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MvccStats {
    pub key_count: i64,
    pub val_count: i64,
    pub val_bytes: i64,
    pub intent_count: i64,
    pub intent_bytes: i64,
}

impl MvccStats {
    pub fn add(&mut self, other: &MvccStats) {
        self.key_count += other.key_count;
        self.val_count += other.val_count;
        self.val_bytes += other.val_bytes;
        self.intent_count += other.intent_count;
        self.intent_bytes += other.intent_bytes;
    }

    pub fn is_zero(&self) -> bool {
        *self == MvccStats::default()
    }
}
