//! # Intent Cleanup After Application
//!
//! ```text
//! EndTxn(commit, lock spans k1 + x)
//!     ├─ k1 (this range)   ──→ resolved in the same batch
//!     └─ x  (other range)  ──→ txn record kept, x handed to the resolver
//!                                   ↓ after the command applies
//!                              AsyncIntentResolver: resolve x, drop record
//! ```

#[cfg(test)]
mod tests {
    use super::super::harness::{txn_at, TestNode, RANGE_ID};
    use replica_write::{
        BatchRequest, EndTxnRequest, Request, RequestContext, TransactionStatus, WriteError,
    };
    use shared_types::{Key, Span, Timestamp};

    #[tokio::test]
    async fn test_external_intents_resolved_after_commit() {
        let node = TestNode::start();
        let ctx = RequestContext::background();
        let txn = txn_at("k1", Timestamp::new(2_000, 0));
        // Written through the range that owns "x".
        node.seed_intent("x", "remote", &txn);

        let ba = BatchRequest::transactional(RANGE_ID, txn).with(Request::put("k1", "local"));
        let pending = node.send(&ctx, ba).await.unwrap().txn.unwrap();

        let mut et = EndTxnRequest::commit();
        et.lock_spans = vec![Span::point("k1"), Span::point("x")];
        let ba = BatchRequest::transactional(RANGE_ID, pending).with(Request::EndTxn(et));
        let br = node.send(&ctx, ba).await.unwrap();
        let committed = br.txn.unwrap();
        assert_eq!(committed.status, TransactionStatus::Committed);

        node.resolver.wait_idle().await;
        assert_eq!(node.value("k1").as_deref(), Some("local"));
        assert_eq!(node.value("x").as_deref(), Some("remote"));
        assert!(node.engine.intent(&Key::from("x")).is_none());
        assert!(node.engine.txn_record(&committed.id).is_none());
    }

    #[tokio::test]
    async fn test_write_blocked_by_intent_until_owner_commits() {
        let node = TestNode::start();
        let ctx = RequestContext::background();
        let txn = txn_at("c", Timestamp::new(2_000, 0));
        let ba = BatchRequest::transactional(RANGE_ID, txn).with(Request::put("c", "txn"));
        let pending = node.send(&ctx, ba).await.unwrap().txn.unwrap();

        let err = node
            .put("c", "plain", Timestamp::new(3_000, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::WriteIntent { .. }));
        assert_eq!(err.intents().len(), 1);
        // The owner is still running, so cleanup leaves the intent alone.
        node.resolver.wait_idle().await;
        assert!(node.engine.intent(&Key::from("c")).is_some());

        let mut et = EndTxnRequest::commit();
        et.lock_spans = vec![Span::point("c")];
        let ba = BatchRequest::transactional(RANGE_ID, pending).with(Request::EndTxn(et));
        node.send(&ctx, ba).await.unwrap();

        node.put("c", "plain", Timestamp::new(3_000, 0)).await.unwrap();
        assert_eq!(node.value("c").as_deref(), Some("plain"));
        assert_eq!(
            node.engine.get_at(&Key::from("c"), Timestamp::new(2_500, 0)),
            Some(b"txn".to_vec())
        );
    }
}
