//! # Keys and Spans

use serde::{Deserialize, Serialize};
use std::fmt;

/// A key in the ordered key space.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(pub Vec<u8>);

impl Key {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The immediate successor of this key in byte order.
    pub fn next(&self) -> Key {
        let mut bytes = self.0.clone();
        bytes.push(0);
        Key(bytes)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Key(b.to_vec())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// A key or a half-open key interval `[key, end_key)`.
///
/// A span without an end key addresses the single key `key`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub key: Key,
    pub end_key: Option<Key>,
}

impl Span {
    pub fn point(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            end_key: None,
        }
    }

    pub fn range(key: impl Into<Key>, end_key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            end_key: Some(end_key.into()),
        }
    }

    /// Exclusive upper bound of the span.
    pub fn exclusive_end(&self) -> Key {
        match &self.end_key {
            Some(end) => end.clone(),
            None => self.key.next(),
        }
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        match &self.end_key {
            Some(end) => &self.key <= key && key < end,
            None => &self.key == key,
        }
    }

    /// Whether `other` lies entirely within this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.key <= other.key && other.exclusive_end() <= self.exclusive_end()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.key < other.exclusive_end() && other.key < self.exclusive_end()
    }
}

impl From<Key> for Span {
    fn from(key: Key) -> Self {
        Span { key, end_key: None }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.end_key {
            Some(end) => write!(f, "[{:?}, {:?})", self.key, end),
            None => write!(f, "{:?}", self.key),
        }
    }
}
