//! Byte ranges for engine range scans.

use bytes::{BufMut, Bytes, BytesMut};
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::ops::{Bound, RangeBounds};

/// Byte appended to a prefix to form the exclusive upper bound of a prefix scan.
pub const PREFIX_UPPER_SENTINEL: u8 = 0xFF;

/// A range over byte sequences, used for key range queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytesRange {
    pub start: Bound<Bytes>,
    pub end: Bound<Bytes>,
}

impl BytesRange {
    pub fn new(start: Bound<Bytes>, end: Bound<Bytes>) -> Self {
        Self { start, end }
    }

    /// Creates the half-open range `[prefix, prefix ++ 0xFF)`.
    ///
    /// Every key that starts with `prefix` and never carries a `0xFF` byte
    /// falls inside the range, which lets the engine do prefix matching
    /// natively instead of filtering client-side. An empty prefix yields
    /// an unbounded range.
    pub fn prefix(prefix: Bytes) -> Self {
        if prefix.is_empty() {
            return Self::unbounded();
        }
        let mut end = BytesMut::with_capacity(prefix.len() + 1);
        end.extend_from_slice(&prefix);
        end.put_u8(PREFIX_UPPER_SENTINEL);
        Self {
            start: Included(prefix),
            end: Excluded(end.freeze()),
        }
    }

    pub fn contains(&self, k: &[u8]) -> bool {
        (match &self.start {
            Included(s) => k >= s,
            Excluded(s) => k > s,
            Unbounded => true,
        }) && (match &self.end {
            Included(e) => k <= e,
            Excluded(e) => k < e,
            Unbounded => true,
        })
    }

    /// Creates a range that scans everything.
    pub fn unbounded() -> Self {
        Self {
            start: Unbounded,
            end: Unbounded,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!((&self.start, &self.end), (Unbounded, Unbounded))
    }
}

impl Default for BytesRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl RangeBounds<Bytes> for BytesRange {
    fn start_bound(&self) -> Bound<&Bytes> {
        self.start.as_ref()
    }
    fn end_bound(&self) -> Bound<&Bytes> {
        self.end.as_ref()
    }
}
