//! # Lease Flows Through the Write Path
//!
//! Lease requests skip the leaseholder check and are evaluated under the
//! lease they replace; the log installs the new lease when they apply.

#[cfg(test)]
mod tests {
    use super::super::harness::{TestNode, RANGE_ID};
    use replica_write::adapters::DEFAULT_LEASE_DURATION_NANOS;
    use replica_write::ports::{Clock, LeaseAuthority};
    use replica_write::{BatchRequest, Request, RequestContext, Response, WriteError};
    use shared_types::{ReplicaId, Timestamp};

    #[tokio::test]
    async fn test_first_write_acquires_lease() {
        let node = TestNode::start();
        assert!(node.lease.current_lease().is_none());

        node.put("k", "v", Timestamp::new(2_000, 0)).await.unwrap();

        let lease = node.lease.current_lease().unwrap();
        assert_eq!(lease.replica, ReplicaId::new(1, 1));
        assert_eq!(lease.sequence, 1);
    }

    #[tokio::test]
    async fn test_transfer_moves_lease_and_later_writes_are_redirected() {
        let node = TestNode::start();
        node.put("k", "v", Timestamp::new(2_000, 0)).await.unwrap();
        let target = ReplicaId::new(2, 2);
        let req = node.lease.transfer_request(target).unwrap();

        let ba = BatchRequest::new(RANGE_ID, node.clock.now()).with(Request::TransferLease(req));
        let br = node.send(&RequestContext::background(), ba).await.unwrap();

        assert_eq!(br.responses, vec![Response::Lease]);
        let lease = node.lease.current_lease().unwrap();
        assert_eq!(lease.replica, target);
        assert_eq!(lease.sequence, 2);
        // Lease requests are not sequenced by lease applied index.
        assert_eq!(node.log.applied_index(), 1);

        let err = node
            .put("k", "w", Timestamp::new(3_000, 0))
            .await
            .unwrap_err();
        match err {
            WriteError::NotLeaseHolder { lease_holder, .. } => {
                assert_eq!(lease_holder, Some(target))
            }
            other => panic!("expected NotLeaseHolder, got {other}"),
        }
        assert_eq!(node.value("k").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_replayed_transfer_is_rejected() {
        let node = TestNode::start();
        node.put("k", "v", Timestamp::new(2_000, 0)).await.unwrap();
        let req = node.lease.transfer_request(ReplicaId::new(2, 2)).unwrap();
        let ctx = RequestContext::background();

        let ba = BatchRequest::new(RANGE_ID, node.clock.now()).with(Request::TransferLease(req));
        node.send(&ctx, ba.clone()).await.unwrap();
        let err = node.send(&ctx, ba).await.unwrap_err();

        assert!(matches!(err, WriteError::LeaseRejected(_)));
        assert_eq!(node.latches.held(), 0);
    }

    #[tokio::test]
    async fn test_expired_lease_is_renewed_by_next_write() {
        let node = TestNode::start();
        node.put("a", "1", node.clock.now()).await.unwrap();

        node.clock.advance(DEFAULT_LEASE_DURATION_NANOS + 1);
        node.put("b", "2", node.clock.now()).await.unwrap();

        let lease = node.lease.current_lease().unwrap();
        assert_eq!(lease.sequence, 2);
        assert!(lease.covers(node.clock.now()));
        assert_eq!(node.value("b").as_deref(), Some("2"));
        assert_eq!(node.tracker.released(RANGE_ID), Some((1, 2)));
    }

    #[tokio::test]
    async fn test_write_outside_range_is_rejected() {
        let node = TestNode::start();

        let err = node
            .put("x", "v", Timestamp::new(2_000, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::RangeKeyMismatch { .. }));
        assert_eq!(node.tracker.in_flight(), 0);
        assert_eq!(node.latches.held(), 0);
    }
}
