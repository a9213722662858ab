//! Driving ports (inbound API)

use crate::domain::{BatchRequest, BatchResponse, LatchGuard, RequestContext, SpanSet, WriteError};
use async_trait::async_trait;

/// Entry point of the replicated write path.
#[async_trait]
pub trait WriteBatchApi: Send + Sync {
    /// Evaluate `ba`, replicate its effects and wait for them to apply.
    ///
    /// `spans` are the spans `guard`'s latches cover. The guard is released
    /// exactly once: by the consensus log after application, or by this call
    /// on every path that never hands it to the log.
    async fn execute_write_batch(
        &self,
        ctx: &RequestContext,
        ba: BatchRequest,
        spans: SpanSet,
        guard: LatchGuard,
    ) -> Result<BatchResponse, WriteError>;
}
