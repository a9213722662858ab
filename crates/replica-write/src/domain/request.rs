//! Write batches and the requests they carry.

use super::lease::Lease;
use super::transaction::Transaction;
use serde::{Deserialize, Serialize};
use shared_types::{Key, RangeId, Span, Timestamp};
use std::collections::BTreeMap;

/// Side effects a committing transaction asks the range to carry out once
/// its commit applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitTrigger {
    /// The transaction modified well-known system spans.
    ModifiedSpan {
        /// Re-gossip the system configuration.
        system_config: bool,
        /// Re-gossip node liveness records in this span.
        node_liveness: Option<Span>,
    },
}

/// Ends a transaction, committing or aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndTxnRequest {
    pub commit: bool,
    /// The transaction may not commit at or above this timestamp.
    pub deadline: Option<Timestamp>,
    /// Fail rather than fall back to the multi-step commit path.
    pub require_one_phase_commit: bool,
    /// The client holds no refresh spans, so the commit timestamp may move
    /// up without re-validating reads.
    pub can_commit_at_higher_timestamp: bool,
    pub commit_trigger: Option<CommitTrigger>,
    /// Every span the transaction has written, including this batch.
    pub lock_spans: Vec<Span>,
}

impl EndTxnRequest {
    pub fn commit() -> Self {
        Self {
            commit: true,
            deadline: None,
            require_one_phase_commit: false,
            can_commit_at_higher_timestamp: true,
            commit_trigger: None,
            lock_spans: Vec::new(),
        }
    }

    pub fn rollback() -> Self {
        Self {
            commit: false,
            ..Self::commit()
        }
    }
}

/// A lease request carries the new lease and the lease it expects to replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRequest {
    pub lease: Lease,
    pub prev_lease: Lease,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Put { key: Key, value: Vec<u8> },
    Delete { key: Key },
    Increment { key: Key, increment: i64 },
    EndTxn(EndTxnRequest),
    RequestLease(LeaseRequest),
    TransferLease(LeaseRequest),
}

impl Request {
    pub fn put(key: impl Into<Key>, value: impl Into<Vec<u8>>) -> Self {
        Request::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Key>) -> Self {
        Request::Delete { key: key.into() }
    }

    pub fn increment(key: impl Into<Key>, increment: i64) -> Self {
        Request::Increment {
            key: key.into(),
            increment,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Request::Put { .. } => "Put",
            Request::Delete { .. } => "Delete",
            Request::Increment { .. } => "Increment",
            Request::EndTxn(_) => "EndTxn",
            Request::RequestLease(_) => "RequestLease",
            Request::TransferLease(_) => "TransferLease",
        }
    }

    /// Key written by a point write. `None` for requests that do not write
    /// user data.
    pub fn write_key(&self) -> Option<&Key> {
        match self {
            Request::Put { key, .. }
            | Request::Delete { key }
            | Request::Increment { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Whether the request's timestamp must be checked against earlier reads.
    pub fn consults_timestamp_cache(&self) -> bool {
        self.write_key().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchHeader {
    pub range_id: RangeId,
    /// Timestamp of non-transactional batches; the read timestamp of
    /// transactional ones.
    pub timestamp: Timestamp,
    pub txn: Option<Transaction>,
}

/// An ordered set of requests addressed to one range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub header: BatchHeader,
    pub requests: Vec<Request>,
}

impl BatchRequest {
    pub fn new(range_id: RangeId, timestamp: Timestamp) -> Self {
        Self {
            header: BatchHeader {
                range_id,
                timestamp,
                txn: None,
            },
            requests: Vec::new(),
        }
    }

    /// A batch on behalf of `txn`, evaluated at its read timestamp.
    pub fn transactional(range_id: RangeId, txn: Transaction) -> Self {
        Self {
            header: BatchHeader {
                range_id,
                timestamp: txn.read_timestamp,
                txn: Some(txn),
            },
            requests: Vec::new(),
        }
    }

    pub fn with(mut self, request: Request) -> Self {
        self.requests.push(request);
        self
    }

    pub fn txn(&self) -> Option<&Transaction> {
        self.header.txn.as_ref()
    }

    /// The timestamp writes of this batch land at.
    pub fn write_timestamp(&self) -> Timestamp {
        self.header
            .txn
            .as_ref()
            .map_or(self.header.timestamp, |txn| txn.write_timestamp)
    }

    /// The trailing EndTxn request, if any.
    pub fn end_txn(&self) -> Option<&EndTxnRequest> {
        match self.requests.last() {
            Some(Request::EndTxn(et)) => Some(et),
            _ => None,
        }
    }

    /// Whether the batch holds every write of its transaction and ends it,
    /// i.e. no intent of the transaction exists outside this batch.
    ///
    /// The EndTxn's lock spans must list exactly the keys written here: a
    /// span naming any other key was written by an earlier batch, and a
    /// written key missing from the spans means the lock spans are not the
    /// transaction's full footprint.
    pub fn is_complete_transaction(&self) -> bool {
        let Some(et) = self.end_txn() else {
            return false;
        };
        if self.header.txn.is_none() {
            return false;
        }
        let written: Vec<&Key> = self.requests.iter().filter_map(Request::write_key).collect();
        let spans_written = et
            .lock_spans
            .iter()
            .all(|span| written.iter().any(|key| span == &Span::point((*key).clone())));
        let writes_declared = written
            .iter()
            .all(|key| et.lock_spans.iter().any(|span| span.contains_key(key)));
        spans_written && writes_declared
    }

    /// A lone lease request; these are exempt from the leaseholder check.
    pub fn is_single_skip_lease_check_request(&self) -> bool {
        self.requests.len() == 1
            && matches!(
                self.requests[0],
                Request::RequestLease(_) | Request::TransferLease(_)
            )
    }

    pub fn is_lease_request(&self) -> bool {
        self.is_single_skip_lease_check_request()
    }

    /// The lease a lone lease request expects to replace.
    pub fn prev_lease_for_lease_request(&self) -> Option<&Lease> {
        match self.requests.first() {
            Some(Request::RequestLease(req)) | Some(Request::TransferLease(req))
                if self.requests.len() == 1 =>
            {
                Some(&req.prev_lease)
            }
            _ => None,
        }
    }

    /// Smallest span covering every key the batch addresses.
    pub fn key_bounds(&self) -> Option<Span> {
        let mut keys = self.requests.iter().filter_map(Request::write_key).chain(
            self.end_txn()
                .and(self.header.txn.as_ref())
                .map(|txn| &txn.key),
        );
        let first = keys.next()?;
        let (min, max) = keys.fold((first, first), |(lo, hi), k| (lo.min(k), hi.max(k)));
        if min == max {
            Some(Span::point(min.clone()))
        } else {
            Some(Span::range(min.clone(), max.next()))
        }
    }

    /// Short human-readable description, e.g. `2 Put, 1 EndTxn`.
    pub fn summary(&self) -> String {
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut order = Vec::new();
        for req in &self.requests {
            let count = counts.entry(req.method()).or_default();
            if *count == 0 {
                order.push(req.method());
            }
            *count += 1;
        }
        order
            .into_iter()
            .map(|m| format!("{} {}", counts[m], m))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
