//! Query specification.
//!
//! A [`Query`] is immutable once built. Stages run in a fixed order
//! regardless of the order builder methods are called in:
//!
//! 1. range scan, bounded natively by the engine when a prefix is set
//! 2. filters, in the order given
//! 3. orders, in the order given, each a full stable re-sort
//! 4. offset
//! 5. limit
//! 6. value stripping for keys-only queries
//!
//! Filters and orders always see values. A keys-only query skips the value
//! fetch only when it has neither.
//!
//! Orders materialize every remaining pair in memory; result sets of
//! ordered queries must fit in memory. Unordered queries stream.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::key::Key;
use crate::model::Pair;

/// A predicate over pairs. Pairs for which `matches` returns `false` are dropped.
pub trait QueryFilter: Send + Sync {
    fn matches(&self, pair: &Pair) -> Result<bool>;
}

/// A total order over pairs.
pub trait QueryOrder: Send + Sync {
    fn compare(&self, a: &Pair, b: &Pair) -> Result<Ordering>;
}

struct FnFilter<F>(F);

impl<F> QueryFilter for FnFilter<F>
where
    F: Fn(&Pair) -> Result<bool> + Send + Sync,
{
    fn matches(&self, pair: &Pair) -> Result<bool> {
        (self.0)(pair)
    }
}

struct FnOrder<F>(F);

impl<F> QueryOrder for FnOrder<F>
where
    F: Fn(&Pair, &Pair) -> Result<Ordering> + Send + Sync,
{
    fn compare(&self, a: &Pair, b: &Pair) -> Result<Ordering> {
        (self.0)(a, b)
    }
}

/// Orders pairs by key.
#[derive(Debug, Clone, Copy)]
pub struct KeyOrder {
    pub descending: bool,
}

impl QueryOrder for KeyOrder {
    fn compare(&self, a: &Pair, b: &Pair) -> Result<Ordering> {
        let ordering = a.key.cmp(&b.key);
        Ok(if self.descending {
            ordering.reverse()
        } else {
            ordering
        })
    }
}

/// Orders pairs by value bytes. Missing values sort first.
#[derive(Debug, Clone, Copy)]
pub struct ValueOrder {
    pub descending: bool,
}

impl QueryOrder for ValueOrder {
    fn compare(&self, a: &Pair, b: &Pair) -> Result<Ordering> {
        let ordering = a.value.cmp(&b.value);
        Ok(if self.descending {
            ordering.reverse()
        } else {
            ordering
        })
    }
}

/// Keeps pairs whose key lies strictly below `ancestor`.
#[derive(Debug, Clone)]
pub struct DescendantFilter {
    pub ancestor: Key,
}

impl QueryFilter for DescendantFilter {
    fn matches(&self, pair: &Pair) -> Result<bool> {
        Ok(self.ancestor.is_ancestor_of(&pair.key))
    }
}

/// An immutable query over a datastore.
#[derive(Clone, Default)]
pub struct Query {
    prefix: Option<Key>,
    filters: Vec<Arc<dyn QueryFilter>>,
    orders: Vec<Arc<dyn QueryOrder>>,
    offset: usize,
    limit: Option<usize>,
    keys_only: bool,
}

impl Query {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// A query over every pair in the store.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn prefix(&self) -> Option<&Key> {
        self.prefix.as_ref()
    }

    pub fn filters(&self) -> &[Arc<dyn QueryFilter>] {
        &self.filters
    }

    pub fn orders(&self) -> &[Arc<dyn QueryOrder>] {
        &self.orders
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn keys_only(&self) -> bool {
        self.keys_only
    }

    /// True if the engine scan must return values.
    pub(crate) fn needs_values(&self) -> bool {
        !self.keys_only || !self.filters.is_empty() || !self.orders.is_empty()
    }

    /// The same query with values stripped from its results.
    pub fn into_keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("prefix", &self.prefix)
            .field("filters", &self.filters.len())
            .field("orders", &self.orders.len())
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("keys_only", &self.keys_only)
            .finish()
    }
}

/// Builder for [`Query`].
///
/// # Example
///
/// ```ignore
/// let query = Query::builder()
///     .prefix(Key::new("/users")?)
///     .filter(|pair| Ok(pair.value.as_ref().is_some_and(|v| !v.is_empty())))
///     .order_by(KeyOrder { descending: true })
///     .offset(10)
///     .limit(5)
///     .build();
/// ```
#[derive(Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Restricts the scan to keys that start with `prefix`'s canonical bytes.
    pub fn prefix(mut self, prefix: Key) -> Self {
        self.query.prefix = Some(prefix);
        self
    }

    pub fn filter<F>(self, f: F) -> Self
    where
        F: Fn(&Pair) -> Result<bool> + Send + Sync + 'static,
    {
        self.filter_by(FnFilter(f))
    }

    pub fn filter_by(mut self, filter: impl QueryFilter + 'static) -> Self {
        self.query.filters.push(Arc::new(filter));
        self
    }

    pub fn order<F>(self, f: F) -> Self
    where
        F: Fn(&Pair, &Pair) -> Result<Ordering> + Send + Sync + 'static,
    {
        self.order_by(FnOrder(f))
    }

    pub fn order_by(mut self, order: impl QueryOrder + 'static) -> Self {
        self.query.orders.push(Arc::new(order));
        self
    }

    /// Skips the first `offset` pairs that survive filters and orders.
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = offset;
        self
    }

    /// Caps the number of pairs returned. `0` returns nothing.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Strips values from the results. Filters and orders still see them.
    pub fn keys_only(mut self, keys_only: bool) -> Self {
        self.query.keys_only = keys_only;
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}
