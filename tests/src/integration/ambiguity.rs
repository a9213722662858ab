//! # Proposal Lifecycle: Ambiguity, Shutdown and Slow Commands
//!
//! Once a command is handed to the log, a proposer that stops waiting can
//! no longer say whether it applied. These flows pause the log's applier to
//! hold commands in flight.

#[cfg(test)]
mod tests {
    use super::super::harness::{TestNode, RANGE_ID};
    use replica_write::{BatchRequest, Request, RequestContext, WriteConfig, WriteError};
    use shared_types::Timestamp;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn put(key: &str, value: &str) -> BatchRequest {
        BatchRequest::new(RANGE_ID, Timestamp::new(2_000, 0)).with(Request::put(key, value))
    }

    #[tokio::test]
    async fn test_cancel_after_proposing_is_ambiguous_and_still_applies() {
        let node = TestNode::start();
        node.log.pause();
        let ctx = RequestContext::background();

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ctx.cancel();
        };
        let (res, ()) = tokio::join!(node.send(&ctx, put("k", "v")), cancel);

        let err = res.unwrap_err();
        assert!(err.is_ambiguous());
        assert_eq!(err.to_string(), "result is ambiguous (context canceled)");
        // The queued command still owns its latches.
        assert_eq!(node.latches.held(), 1);
        assert!(node.value("k").is_none());

        node.log.resume();
        node.wait_latches_released().await;
        assert_eq!(node.value("k").as_deref(), Some("v"));
        assert_eq!(node.log.applied_index(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_after_proposing_is_ambiguous() {
        let node = TestNode::start();
        node.log.pause();
        let ctx = RequestContext::background();

        let stop = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            node.stopper.stop();
        };
        let (res, ()) = tokio::join!(node.send(&ctx, put("k", "v")), stop);

        assert_eq!(
            res.unwrap_err().to_string(),
            "result is ambiguous (server shutdown)"
        );
        node.log.resume();
        node.wait_latches_released().await;
    }

    #[tokio::test]
    async fn test_cancel_before_proposing_is_a_clean_rejection() {
        let node = TestNode::start();
        let ctx = RequestContext::background();
        ctx.cancel();

        let err = node.send(&ctx, put("k", "v")).await.unwrap_err();

        assert!(matches!(err, WriteError::AbortedBeforeProposing(_)));
        assert!(!err.is_ambiguous());
        assert_eq!(node.latches.held(), 0);
        assert_eq!(node.tracker.in_flight(), 0);
        assert_eq!(node.log.applied_index(), 0);
        assert!(node.value("k").is_none());
    }

    #[tokio::test]
    async fn test_deadline_after_proposing_is_ambiguous() {
        let node = TestNode::start();
        node.log.pause();
        let ctx = RequestContext::with_timeout(Duration::from_millis(20));

        let err = node.send(&ctx, put("k", "v")).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "result is ambiguous (context deadline exceeded)"
        );
        node.log.resume();
        node.wait_latches_released().await;
        assert_eq!(node.value("k").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_slow_command_keeps_waiting_until_applied() {
        let node = TestNode::with_config(WriteConfig {
            slow_request_threshold_ms: 10,
            assert_span_access: true,
            ..WriteConfig::default()
        });
        node.log.pause();
        let resumed = AtomicBool::new(false);
        let ctx = RequestContext::background();

        let resume = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            resumed.store(true, Ordering::SeqCst);
            node.log.resume();
        };
        let (res, ()) = tokio::join!(node.send(&ctx, put("k", "v")), resume);

        res.unwrap();
        assert!(resumed.load(Ordering::SeqCst));
        assert_eq!(node.value("k").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_closed_log_rejects_and_releases_everything() {
        let node = TestNode::start();
        node.log.close();

        let err = node
            .send(&RequestContext::background(), put("k", "v"))
            .await
            .unwrap_err();

        assert!(matches!(err, WriteError::ProposalRejected(_)));
        assert!(!err.is_ambiguous());
        assert_eq!(node.latches.held(), 0);
        assert_eq!(node.tracker.in_flight(), 0);
        assert_eq!(node.tracker.released(RANGE_ID), None);
    }
}
