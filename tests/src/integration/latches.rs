//! # Latch Serialization
//!
//! A command keeps its latches until it applies, so a conflicting write
//! waits for the earlier one to land while disjoint writes proceed.

#[cfg(test)]
mod tests {
    use super::super::harness::TestNode;
    use shared_types::Timestamp;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_conflicting_writes_apply_in_latch_order() {
        let node = TestNode::start();
        node.log.pause();
        let second_done = AtomicBool::new(false);

        let first = node.put("k", "first", Timestamp::new(2_000, 0));
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let res = node.put("k", "second", Timestamp::new(3_000, 0)).await;
            second_done.store(true, Ordering::SeqCst);
            res
        };
        let control = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            // The second write is parked behind the first one's latches.
            assert_eq!(node.latches.held(), 1);
            assert!(!second_done.load(Ordering::SeqCst));
            node.log.resume();
        };
        let (first, second, ()) = tokio::join!(first, second, control);

        first.unwrap();
        second.unwrap();
        assert_eq!(node.value("k").as_deref(), Some("second"));
        assert_eq!(node.log.applied_index(), 2);
        assert_eq!(node.latches.held(), 0);
    }

    #[tokio::test]
    async fn test_disjoint_writes_hold_latches_together() {
        let node = TestNode::start();
        node.log.pause();

        let a = node.put("a", "1", Timestamp::new(2_000, 0));
        let b = node.put("b", "2", Timestamp::new(2_000, 0));
        let control = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(node.latches.held(), 2);
            node.log.resume();
        };
        let (a, b, ()) = tokio::join!(a, b, control);

        a.unwrap();
        b.unwrap();
        assert_eq!(node.value("a").as_deref(), Some("1"));
        assert_eq!(node.value("b").as_deref(), Some("2"));
    }
}
