//! Data types returned by queries.

use bytes::Bytes;

use crate::key::Key;

/// A key and, unless the query was keys-only, its stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    /// The key.
    pub key: Key,
    /// The value. `None` for keys-only queries.
    pub value: Option<Bytes>,
}

impl Pair {
    pub fn new(key: Key, value: Bytes) -> Self {
        Self {
            key,
            value: Some(value),
        }
    }

    pub fn key_only(key: Key) -> Self {
        Self { key, value: None }
    }
}
