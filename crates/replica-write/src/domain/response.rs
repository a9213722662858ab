//! Batch responses.

use super::transaction::Transaction;
use serde::{Deserialize, Serialize};
use shared_types::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Put,
    Delete { found: bool },
    Increment { new_value: i64 },
    EndTxn { one_phase_commit: bool },
    Lease,
}

/// One response per request of the batch, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Timestamp the batch executed at.
    pub timestamp: Timestamp,
    /// The transaction as updated by evaluation.
    pub txn: Option<Transaction>,
    pub responses: Vec<Response>,
}
