//! Uncertainty interval limiting.

use crate::domain::{BatchRequest, LeaseStatus};
use shared_types::NodeId;

/// Cap the transaction's uncertainty interval with the clock reading it
/// observed from this node.
///
/// Values written by this node after the observation cannot have been
/// written before the transaction started. The observation is only trusted
/// from the start of the current lease onwards; before that, another node
/// may have written under an earlier lease. Without a valid lease status
/// (lease requests) the raw observation applies.
pub fn limit_txn_max_timestamp(
    ba: &mut BatchRequest,
    node_id: NodeId,
    status: Option<&LeaseStatus>,
) {
    let Some(txn) = ba.header.txn.as_mut() else {
        return;
    };
    let Some(mut observed) = txn.observed_timestamp(node_id) else {
        return;
    };
    if let Some(status) = status.filter(|s| s.is_valid()) {
        observed.forward(status.lease.start);
    }
    if observed < txn.max_timestamp {
        tracing::trace!(from = %txn.max_timestamp, to = %observed, "limiting uncertainty interval");
        txn.max_timestamp = observed;
    }
}
