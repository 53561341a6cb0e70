//! Atomic write batches.

use std::sync::Arc;

use bytes::Bytes;
use common::EngineOp;

use crate::datastore::Shared;
use crate::error::{Error, Result};
use crate::key::Key;

/// A pending batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Key, value: Bytes },
    Delete { key: Key },
}

/// An ordered set of writes committed atomically.
///
/// `put` and `delete` only append to memory. [`commit`](Self::commit)
/// consumes the batch, so a batch can never be committed twice. Nothing in
/// the batch is visible to reads until `commit` returns `Ok`, and on failure
/// none of it is.
pub struct Batch {
    shared: Arc<Shared>,
    ops: Vec<BatchOp>,
}

impl Batch {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            ops: Vec::new(),
        }
    }

    pub fn put(&mut self, key: Key, value: Bytes) {
        self.ops.push(BatchOp::Put { key, value });
    }

    pub fn delete(&mut self, key: Key) {
        self.ops.push(BatchOp::Delete { key });
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every operation atomically, in append order.
    ///
    /// An empty batch commits without touching the engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOpen`] if the store is not open, or
    /// [`Error::WriteFailed`] if the engine rejects the write.
    #[tracing::instrument(level = "trace", skip_all, fields(ops = self.ops.len()))]
    pub async fn commit(self) -> Result<()> {
        self.shared.ensure_open()?;
        if self.ops.is_empty() {
            return Ok(());
        }
        let ops = self
            .ops
            .into_iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => EngineOp::Put(key.to_bytes(), value),
                BatchOp::Delete { key } => EngineOp::Delete(key.to_bytes()),
            })
            .collect();
        self.shared
            .engine
            .write(ops)
            .await
            .map_err(|e| Error::WriteFailed(e.to_string()))
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch").field("ops", &self.ops).finish()
    }
}
