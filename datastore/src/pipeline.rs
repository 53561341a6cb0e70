//! Lazy query results.
//!
//! [`QueryIterator`] drives a [`Cursor`] through the stages of a
//! [`Query`]. Without orders it streams one pair at a time; with orders it
//! drains the cursor once, sorts, and serves from memory.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;

use crate::cursor::Cursor;
use crate::error::Result;
use crate::key::Key;
use crate::model::Pair;
use crate::query::{Query, QueryFilter, QueryOrder};

/// Iterator over the pairs matching a query.
///
/// The underlying cursor is closed when the results are exhausted, when the
/// limit is reached, when any stage fails, or on [`close`](Self::close).
/// Call `close` when abandoning the iterator early.
pub struct QueryIterator {
    cursor: Cursor,
    filters: Vec<Arc<dyn QueryFilter>>,
    orders: Vec<Arc<dyn QueryOrder>>,
    keys_only: bool,
    offset: usize,
    limit: Option<usize>,
    skipped: usize,
    yielded: usize,
    sorted: Option<VecDeque<Pair>>,
    done: bool,
}

impl QueryIterator {
    pub(crate) fn new(cursor: Cursor, query: Query) -> Self {
        Self {
            cursor,
            filters: query.filters().to_vec(),
            orders: query.orders().to_vec(),
            keys_only: query.keys_only(),
            offset: query.offset(),
            limit: query.limit(),
            skipped: 0,
            yielded: 0,
            sorted: None,
            done: false,
        }
    }

    /// Returns the next pair, or None if iteration is complete.
    pub async fn next(&mut self) -> Result<Option<Pair>> {
        if self.done {
            return Ok(None);
        }
        if self.limit.is_some_and(|limit| self.yielded >= limit) {
            self.close().await?;
            return Ok(None);
        }

        loop {
            let pair = match self.pull().await {
                Ok(Some(pair)) => pair,
                Ok(None) => {
                    self.close().await?;
                    return Ok(None);
                }
                Err(err) => {
                    self.abort().await;
                    return Err(err);
                }
            };

            if self.skipped < self.offset {
                self.skipped += 1;
                continue;
            }

            self.yielded += 1;
            if self.limit.is_some_and(|limit| self.yielded >= limit) {
                self.abort().await;
            }
            return Ok(Some(self.strip(pair)));
        }
    }

    /// Stops iteration and releases the underlying cursor. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        self.done = true;
        self.sorted = None;
        self.cursor.close().await
    }

    /// Drains the remaining pairs.
    pub async fn collect(mut self) -> Result<Vec<Pair>> {
        let mut pairs = Vec::new();
        while let Some(pair) = self.next().await? {
            pairs.push(pair);
        }
        Ok(pairs)
    }

    /// Converts the iterator into a [`Stream`].
    ///
    /// Dropping the stream before it ends closes the cursor on a best-effort
    /// basis only; prefer draining it or using [`QueryIterator::close`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Pair>> + Send {
        futures::stream::unfold(self, |mut iter| async move {
            match iter.next().await {
                Ok(Some(pair)) => Some((Ok(pair), iter)),
                Ok(None) => None,
                Err(err) => Some((Err(err), iter)),
            }
        })
    }

    /// Next pair after filters and orders.
    async fn pull(&mut self) -> Result<Option<Pair>> {
        if self.orders.is_empty() {
            return self.pull_filtered().await;
        }
        if self.sorted.is_none() {
            let mut pairs = Vec::new();
            while let Some(pair) = self.pull_filtered().await? {
                pairs.push(pair);
            }
            for order in &self.orders {
                sort_stable(&mut pairs, order.as_ref())?;
            }
            self.sorted = Some(pairs.into());
        }
        Ok(self.sorted.as_mut().and_then(VecDeque::pop_front))
    }

    async fn pull_filtered(&mut self) -> Result<Option<Pair>> {
        'next: while let Some(pair) = self.cursor.next().await? {
            for filter in &self.filters {
                if !filter.matches(&pair)? {
                    continue 'next;
                }
            }
            return Ok(Some(pair));
        }
        Ok(None)
    }

    /// Drops the value of a keys-only result. Orders that need values have
    /// already run by the time a pair is yielded.
    fn strip(&self, mut pair: Pair) -> Pair {
        if self.keys_only {
            pair.value = None;
        }
        pair
    }

    async fn abort(&mut self) {
        if let Err(err) = self.close().await {
            tracing::warn!(error = %err, "failed to close cursor");
        }
    }
}

/// Stable sort with a fallible comparator. The first comparator error wins.
fn sort_stable(pairs: &mut [Pair], order: &dyn QueryOrder) -> Result<()> {
    let mut failure = None;
    pairs.sort_by(|a, b| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        order.compare(a, b).unwrap_or_else(|err| {
            failure = Some(err);
            Ordering::Equal
        })
    });
    failure.map_or(Ok(()), Err)
}

/// Iterator over the keys matching a query.
pub struct KeyIterator {
    inner: QueryIterator,
}

impl KeyIterator {
    pub(crate) fn new(inner: QueryIterator) -> Self {
        Self { inner }
    }

    /// Returns the next key, or None if iteration is complete.
    pub async fn next(&mut self) -> Result<Option<Key>> {
        Ok(self.inner.next().await?.map(|pair| pair.key))
    }

    /// Stops iteration and releases the underlying cursor. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }

    /// Drains the remaining keys.
    pub async fn collect(mut self) -> Result<Vec<Key>> {
        let mut keys = Vec::new();
        while let Some(key) = self.next().await? {
            keys.push(key);
        }
        Ok(keys)
    }

    /// Converts the iterator into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Key>> + Send {
        futures::stream::unfold(self, |mut iter| async move {
            match iter.next().await {
                Ok(Some(key)) => Some((Ok(key), iter)),
                Ok(None) => None,
                Err(err) => Some((Err(err), iter)),
            }
        })
    }
}
