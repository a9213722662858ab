//! Closed timestamp tracking.
//!
//! A timestamp is closed once no write at or below it can still be
//! proposed. Every write registers itself before evaluating and is handed
//! a minimum timestamp above the closed one; the closed timestamp only
//! advances while nothing is registered.

use crate::ports::{ClosedTimestampTracker, Untracker};
use parking_lot::Mutex;
use shared_types::{LeaseAppliedIndex, LeaseEpoch, RangeId, Timestamp};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::trace;

#[derive(Default)]
struct TrackerState {
    closed: Timestamp,
    next_token: u64,
    in_flight: BTreeSet<u64>,
    /// Highest lease applied index released per range, with its epoch.
    released: HashMap<RangeId, (LeaseEpoch, LeaseAppliedIndex)>,
}

#[derive(Clone, Default)]
pub struct InMemoryClosedTsTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl InMemoryClosedTsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closed(&self) -> Timestamp {
        self.state.lock().closed
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Try to close `target`. Returns the closed timestamp afterwards, which
    /// stays put while writes are in flight.
    pub fn close(&self, target: Timestamp) -> Timestamp {
        let mut state = self.state.lock();
        if state.in_flight.is_empty() && state.closed.forward(target) {
            trace!(closed = %state.closed, "closed timestamp advanced");
        }
        state.closed
    }

    /// Highest lease applied index released for `range_id`.
    pub fn released(&self, range_id: RangeId) -> Option<(LeaseEpoch, LeaseAppliedIndex)> {
        self.state.lock().released.get(&range_id).copied()
    }
}

impl ClosedTimestampTracker for InMemoryClosedTsTracker {
    fn track(&self) -> (Timestamp, Untracker) {
        let mut state = self.state.lock();
        let token = state.next_token;
        state.next_token += 1;
        state.in_flight.insert(token);
        let min_ts = state.closed.next();
        drop(state);

        let tracker = self.state.clone();
        let untracker = Untracker::new(move |epoch, range_id, lai| {
            let mut state = tracker.lock();
            state.in_flight.remove(&token);
            if lai == 0 {
                return;
            }
            let entry = state.released.entry(range_id).or_insert((epoch, lai));
            if (epoch, lai) > *entry {
                *entry = (epoch, lai);
            }
        });
        (min_ts, untracker)
    }
}
