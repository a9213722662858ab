//! Span latches: requests with conflicting span sets run one at a time.

use crate::domain::{LatchGuard, SpanSet};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;

#[derive(Default)]
struct LatchState {
    next_id: u64,
    held: HashMap<u64, SpanSet>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<LatchState>,
    released: Notify,
}

#[derive(Clone, Default)]
pub struct SpanLatchManager {
    inner: Arc<Inner>,
}

impl SpanLatchManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `spans` conflicts with no held latch, then latch them.
    pub async fn acquire(&self, spans: SpanSet) -> LatchGuard {
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(guard) = self.try_acquire(&spans) {
                return guard;
            }
            trace!("waiting on conflicting latches");
            released.await;
        }
    }

    /// Latch `spans` if nothing conflicting is held.
    pub fn try_acquire(&self, spans: &SpanSet) -> Option<LatchGuard> {
        let mut state = self.inner.state.lock();
        if state.held.values().any(|held| held.conflicts_with(spans)) {
            return None;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.held.insert(id, spans.clone());

        let inner = self.inner.clone();
        Some(LatchGuard::new(move || {
            inner.state.lock().held.remove(&id);
            inner.released.notify_waiters();
        }))
    }

    /// Number of latch sets currently held.
    pub fn held(&self) -> usize {
        self.inner.state.lock().held.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SpanAccess;
    use shared_types::Span;
    use std::time::Duration;

    fn spans(access: SpanAccess, key: &str) -> SpanSet {
        let mut set = SpanSet::new();
        set.add(access, Span::point(key));
        set
    }

    #[tokio::test]
    async fn test_conflicting_writer_waits_for_release() {
        let latches = SpanLatchManager::new();
        let mut first = latches.acquire(spans(SpanAccess::ReadWrite, "a")).await;

        let waiter = {
            let latches = latches.clone();
            tokio::spawn(async move { latches.acquire(spans(SpanAccess::ReadWrite, "a")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        first.release();
        let second = waiter.await.unwrap();
        assert!(second.is_held());
        assert_eq!(latches.held(), 1);
    }

    #[tokio::test]
    async fn test_readers_and_disjoint_writers_share() {
        let latches = SpanLatchManager::new();
        let _r1 = latches.acquire(spans(SpanAccess::ReadOnly, "a")).await;
        let _r2 = latches.acquire(spans(SpanAccess::ReadOnly, "a")).await;
        let _w = latches.acquire(spans(SpanAccess::ReadWrite, "b")).await;
        assert_eq!(latches.held(), 3);
        assert!(latches.try_acquire(&spans(SpanAccess::ReadWrite, "a")).is_none());
    }
}
