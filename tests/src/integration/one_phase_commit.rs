//! # One-Phase Commit Flows
//!
//! A transaction whose writes and EndTxn arrive in one batch commits
//! without ever leaving intents:
//!
//! ```text
//! [Put k1, Put k2, EndTxn] ──→ evaluate as non-transactional writes
//!                                  │ pushed? ── may move commit ts? ──→ commit higher
//!                                  │                 └─ no ──→ full path / Require1PC error
//!                                  ↓
//!                          one proposal, one application
//! ```

#[cfg(test)]
mod tests {
    use super::super::harness::{one_pc_batch, txn_at, TestNode, RANGE_ID};
    use replica_write::{
        BatchRequest, EndTxnRequest, Request, RequestContext, Response, TransactionRetryReason,
        TransactionStatus, WriteError,
    };
    use shared_types::{Key, Span, Timestamp};

    #[tokio::test]
    async fn test_one_phase_commit_end_to_end() {
        let node = TestNode::start();
        let txn = txn_at("k1", Timestamp::new(2_000, 0));
        let ba = one_pc_batch(txn, &["k1", "k2"], EndTxnRequest::commit());

        let br = node.send(&RequestContext::background(), ba).await.unwrap();

        let txn = br.txn.expect("response carries txn");
        assert_eq!(txn.status, TransactionStatus::Committed);
        assert_eq!(
            br.responses,
            vec![
                Response::Put,
                Response::Put,
                Response::EndTxn {
                    one_phase_commit: true
                }
            ]
        );
        assert_eq!(node.value("k1").as_deref(), Some("v"));
        assert_eq!(node.value("k2").as_deref(), Some("v"));
        assert!(node.engine.intent(&Key::from("k1")).is_none());
        assert!(node.engine.txn_record(&txn.id).is_none());
        assert_eq!(node.engine.stats().intent_count, 0);

        // One command, sequenced and released to the closed timestamp
        // tracker under the acquired lease.
        assert_eq!(node.log.applied_index(), 1);
        assert_eq!(node.tracker.in_flight(), 0);
        assert_eq!(node.tracker.released(RANGE_ID), Some((1, 1)));
        assert_eq!(node.latches.held(), 0);
    }

    #[tokio::test]
    async fn test_same_batch_on_fast_and_full_path_writes_the_same_rows() {
        let fast = TestNode::start();
        let full = TestNode::start();
        let ctx = RequestContext::background();
        let ts = Timestamp::new(2_000, 0);

        let first_epoch = txn_at("k1", ts);
        // A later epoch without Require1PC must take the full path.
        let mut later_epoch = first_epoch.clone();
        later_epoch.epoch = 1;

        let fast_br = fast
            .send(&ctx, one_pc_batch(first_epoch, &["k1", "k2"], EndTxnRequest::commit()))
            .await
            .unwrap();
        let full_br = full
            .send(&ctx, one_pc_batch(later_epoch, &["k1", "k2"], EndTxnRequest::commit()))
            .await
            .unwrap();

        assert_eq!(fast_br.responses[..2], full_br.responses[..2]);
        assert_eq!(fast_br.responses[..2], [Response::Put, Response::Put]);
        assert_eq!(
            fast_br.responses[2],
            Response::EndTxn {
                one_phase_commit: true
            }
        );
        assert_eq!(
            full_br.responses[2],
            Response::EndTxn {
                one_phase_commit: false
            }
        );

        let fast_txn = fast_br.txn.unwrap();
        let full_txn = full_br.txn.unwrap();
        assert_eq!(fast_txn.status, TransactionStatus::Committed);
        assert_eq!(full_txn.status, TransactionStatus::Committed);
        assert_eq!(fast_txn.write_timestamp, full_txn.write_timestamp);
        assert_eq!(fast_br.timestamp, full_br.timestamp);

        assert_eq!(fast.engine.snapshot(), full.engine.snapshot());
        for key in ["k1", "k2"] {
            let key = Key::from(key);
            assert_eq!(fast.engine.latest_timestamp(&key), full.engine.latest_timestamp(&key));
            assert!(full.engine.intent(&key).is_none());
        }
        assert!(full.engine.txn_record(&full_txn.id).is_none());
        assert_eq!(fast.engine.stats(), full.engine.stats());
        assert_eq!(fast.log.applied_index(), 1);
        assert_eq!(full.log.applied_index(), 1);
    }

    #[tokio::test]
    async fn test_one_phase_and_multi_step_commit_write_the_same_data() {
        let fast = TestNode::start();
        let slow = TestNode::start();
        let ts = Timestamp::new(2_000, 0);
        let ctx = RequestContext::background();

        let txn = txn_at("k1", ts);
        fast.send(&ctx, one_pc_batch(txn.clone(), &["k1", "k2"], EndTxnRequest::commit()))
            .await
            .unwrap();

        // Same transaction split over two batches: intents first, then the
        // commit resolves them.
        let ba = BatchRequest::transactional(RANGE_ID, txn)
            .with(Request::put("k1", "v"))
            .with(Request::put("k2", "v"));
        let br = slow.send(&ctx, ba).await.unwrap();
        let pending = br.txn.unwrap();
        assert_eq!(pending.status, TransactionStatus::Pending);
        assert!(slow.engine.intent(&Key::from("k1")).is_some());

        let mut et = EndTxnRequest::commit();
        et.lock_spans = vec![Span::point("k1"), Span::point("k2")];
        let ba = BatchRequest::transactional(RANGE_ID, pending).with(Request::EndTxn(et));
        let br = slow.send(&ctx, ba).await.unwrap();
        assert_eq!(
            br.responses,
            vec![Response::EndTxn {
                one_phase_commit: false
            }]
        );

        assert_eq!(fast.engine.snapshot(), slow.engine.snapshot());
        for key in ["k1", "k2"] {
            let key = Key::from(key);
            assert!(slow.engine.intent(&key).is_none());
            assert_eq!(fast.engine.latest_timestamp(&key), Some(ts));
            assert_eq!(slow.engine.latest_timestamp(&key), Some(ts));
        }
        assert_eq!(fast.log.applied_index(), 1);
        assert_eq!(slow.log.applied_index(), 2);
    }

    #[tokio::test]
    async fn test_earlier_read_pushes_commit_timestamp() {
        let node = TestNode::start();
        node.ts_cache
            .add(Span::point("k1"), Timestamp::new(5_000, 0), None);
        let txn = txn_at("k1", Timestamp::new(2_000, 0));

        let br = node
            .send(
                &RequestContext::background(),
                one_pc_batch(txn, &["k1"], EndTxnRequest::commit()),
            )
            .await
            .unwrap();

        let txn = br.txn.unwrap();
        assert_eq!(txn.status, TransactionStatus::Committed);
        assert_eq!(txn.write_timestamp, Timestamp::new(5_000, 1));
        assert_eq!(br.timestamp, Timestamp::new(5_000, 1));
        assert_eq!(
            node.engine.latest_timestamp(&Key::from("k1")),
            Some(Timestamp::new(5_000, 1))
        );
    }

    #[tokio::test]
    async fn test_required_one_phase_commit_fails_when_pushed() {
        let node = TestNode::start();
        node.seed("k1", "newer", Timestamp::new(3_000, 0));
        let txn = txn_at("k1", Timestamp::new(2_000, 0));
        let mut et = EndTxnRequest::commit();
        et.require_one_phase_commit = true;
        et.can_commit_at_higher_timestamp = false;

        let err = node
            .send(&RequestContext::background(), one_pc_batch(txn, &["k1"], et))
            .await
            .unwrap_err();

        match &err {
            WriteError::TransactionRetry { reason, message, .. } => {
                assert_eq!(*reason, TransactionRetryReason::RetrySerializable);
                assert_eq!(message, "Require1PC batch pushed");
            }
            other => panic!("expected retry error, got {other}"),
        }
        assert!(err.is_retriable_by_client());
        assert_eq!(node.value("k1").as_deref(), Some("newer"));
        assert_eq!(node.log.applied_index(), 0);
        assert_eq!(node.tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_non_transactional_write_retried_above_newer_value() {
        let node = TestNode::start();
        node.seed("k", "old", Timestamp::new(3_000, 0));

        let br = node.put("k", "new", Timestamp::new(2_000, 0)).await.unwrap();

        assert_eq!(br.timestamp, Timestamp::new(3_000, 1));
        assert_eq!(node.value("k").as_deref(), Some("new"));
        assert_eq!(
            node.engine.latest_timestamp(&Key::from("k")),
            Some(Timestamp::new(3_000, 1))
        );
    }

    #[tokio::test]
    async fn test_no_retry_past_commit_deadline() {
        let node = TestNode::start();
        node.seed("k1", "newer", Timestamp::new(3_000, 0));
        let txn = txn_at("k1", Timestamp::new(2_000, 0));
        let mut et = EndTxnRequest::commit();
        et.deadline = Some(Timestamp::new(2_500, 0));

        let err = node
            .send(&RequestContext::background(), one_pc_batch(txn, &["k1"], et))
            .await
            .unwrap_err();

        assert!(err.is_retriable_by_client(), "unexpected error {err}");
        assert_eq!(node.value("k1").as_deref(), Some("newer"));
        assert_eq!(node.log.applied_index(), 0);
    }

    #[tokio::test]
    async fn test_transactional_write_without_commit_is_not_retried() {
        let node = TestNode::start();
        node.seed("k1", "newer", Timestamp::new(3_000, 0));
        let txn = txn_at("k1", Timestamp::new(2_000, 0));
        let ba = BatchRequest::transactional(RANGE_ID, txn).with(Request::put("k1", "v"));

        let err = node
            .send(&RequestContext::background(), ba)
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::WriteTooOld { .. }));
        assert!(node.engine.intent(&Key::from("k1")).is_none());
    }

    #[tokio::test]
    async fn test_one_phase_rollback_writes_nothing() {
        let node = TestNode::start();
        let txn = txn_at("k1", Timestamp::new(2_000, 0));

        let br = node
            .send(
                &RequestContext::background(),
                one_pc_batch(txn, &["k1"], EndTxnRequest::rollback()),
            )
            .await
            .unwrap();

        assert_eq!(br.txn.unwrap().status, TransactionStatus::Aborted);
        assert!(node.value("k1").is_none());
        assert_eq!(node.log.applied_index(), 0);
    }
}
