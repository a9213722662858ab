//! Declared key access of a batch.

use super::request::{BatchRequest, Request};
use shared_types::{Key, Span};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpanAccess {
    ReadOnly,
    ReadWrite,
}

impl fmt::Display for SpanAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanAccess::ReadOnly => f.write_str("read"),
            SpanAccess::ReadWrite => f.write_str("write"),
        }
    }
}

/// The spans a batch declared it would touch. Latches are acquired over
/// these and evaluation may touch nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanSet {
    spans: Vec<(SpanAccess, Span)>,
}

impl SpanSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spans a batch needs: every written key, the transaction's anchor key
    /// for an EndTxn, and the lock spans it resolves.
    pub fn for_batch(ba: &BatchRequest) -> Self {
        let mut set = SpanSet::new();
        for req in &ba.requests {
            if let Some(key) = req.write_key() {
                set.add(SpanAccess::ReadWrite, Span::point(key.clone()));
            }
            if let Request::EndTxn(et) = req {
                if let Some(txn) = ba.txn() {
                    set.add(SpanAccess::ReadWrite, Span::point(txn.key.clone()));
                }
                for span in &et.lock_spans {
                    set.add(SpanAccess::ReadWrite, span.clone());
                }
            }
        }
        set
    }

    pub fn add(&mut self, access: SpanAccess, span: Span) {
        if !self.spans.iter().any(|(a, s)| *a == access && s == &span) {
            self.spans.push((access, span));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(SpanAccess, Span)> {
        self.spans.iter()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Whether `key` was declared with at least `access`. Write access
    /// implies read access.
    pub fn check_allowed(&self, access: SpanAccess, key: &Key) -> bool {
        self.spans
            .iter()
            .any(|(a, s)| *a >= access && s.contains_key(key))
    }

    pub fn check_allowed_span(&self, access: SpanAccess, span: &Span) -> bool {
        self.spans
            .iter()
            .any(|(a, s)| *a >= access && s.contains(span))
    }

    /// Two sets conflict when they overlap and at least one side writes.
    pub fn conflicts_with(&self, other: &SpanSet) -> bool {
        self.spans.iter().any(|(a, s)| {
            other.spans.iter().any(|(b, t)| {
                (*a == SpanAccess::ReadWrite || *b == SpanAccess::ReadWrite) && s.overlaps(t)
            })
        })
    }
}
