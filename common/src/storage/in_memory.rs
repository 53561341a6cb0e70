use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use super::{
    CallbackCursor, CursorShape, Engine, EngineError, EngineOp, EngineRecord, EngineResult,
    EndCallback, IteratorOptions, NativeCursor, NextCallback, PullCursor,
};

/// In-memory implementation of the Engine trait using a BTreeMap.
///
/// This implementation stores all data in memory and is useful for testing
/// or as an engine override where durability is not required.
///
/// Live cursors are counted. Closing the engine while any cursor has not been
/// closed fails, the same way native engines refuse to tear down with
/// iterators still attached.
pub struct InMemoryEngine {
    data: Arc<RwLock<BTreeMap<Bytes, Bytes>>>,
    open: AtomicBool,
    open_cursors: Arc<AtomicUsize>,
    shape: CursorShape,
}

impl InMemoryEngine {
    /// Creates a new InMemoryEngine handing out pull cursors.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            open: AtomicBool::new(false),
            open_cursors: Arc::new(AtomicUsize::new(0)),
            shape: CursorShape::Pull,
        }
    }

    /// Switches the engine to callback-driven `next`/`end` cursors.
    pub fn with_callback_cursors(mut self) -> Self {
        self.shape = CursorShape::Callback;
        self
    }

    /// Number of cursors opened but not yet closed.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::Storage("engine is not open".to_string()))
        }
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for InMemoryEngine {
    fn cursor_shape(&self) -> Option<CursorShape> {
        Some(self.shape)
    }

    async fn open(&self) -> EngineResult<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        let live = self.open_cursors();
        if live > 0 {
            return Err(EngineError::Storage(format!(
                "cannot close engine with {} open cursor(s)",
                live
            )));
        }
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> EngineResult<Bytes> {
        self.ensure_open()?;
        let data = self
            .data
            .read()
            .map_err(|e| EngineError::Internal(format!("Failed to acquire read lock: {}", e)))?;

        data.get(&key).cloned().ok_or(EngineError::NotFound)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn put(&self, key: Bytes, value: Bytes) -> EngineResult<()> {
        self.write(vec![EngineOp::Put(key, value)]).await
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn delete(&self, key: Bytes) -> EngineResult<()> {
        self.write(vec![EngineOp::Delete(key)]).await
    }

    /// Applies all operations within a single write lock acquisition.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn write(&self, ops: Vec<EngineOp>) -> EngineResult<()> {
        self.ensure_open()?;
        let mut data = self
            .data
            .write()
            .map_err(|e| EngineError::Internal(format!("Failed to acquire write lock: {}", e)))?;

        for op in ops {
            match op {
                EngineOp::Put(key, value) => {
                    data.insert(key, value);
                }
                EngineOp::Delete(key) => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn iterator(&self, options: IteratorOptions) -> EngineResult<NativeCursor> {
        self.ensure_open()?;
        let data = self
            .data
            .read()
            .map_err(|e| EngineError::Internal(format!("Failed to acquire read lock: {}", e)))?;

        let records: Vec<EngineRecord> = data
            .range(options.range)
            .map(|(k, v)| EngineRecord {
                key: k.clone(),
                value: options.values.then(|| v.clone()),
            })
            .collect();

        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        let state = CursorState {
            records,
            index: 0,
            ended: false,
            open_cursors: Arc::clone(&self.open_cursors),
        };
        Ok(match self.shape {
            CursorShape::Pull => NativeCursor::Pull(Box::new(InMemoryCursor(state))),
            CursorShape::Callback => NativeCursor::Callback(Box::new(InMemoryCallbackCursor(state))),
        })
    }
}

struct CursorState {
    records: Vec<EngineRecord>,
    index: usize,
    ended: bool,
    open_cursors: Arc<AtomicUsize>,
}

impl CursorState {
    fn step(&mut self) -> EngineResult<Option<EngineRecord>> {
        if self.ended {
            return Err(EngineError::Storage("cursor has already ended".to_string()));
        }
        if self.index >= self.records.len() {
            return Ok(None);
        }
        let record = self.records[self.index].clone();
        self.index += 1;
        Ok(Some(record))
    }

    fn end(&mut self) -> EngineResult<()> {
        if self.ended {
            return Err(EngineError::Storage("end() called twice".to_string()));
        }
        self.ended = true;
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

struct InMemoryCursor(CursorState);

#[async_trait]
impl PullCursor for InMemoryCursor {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn next(&mut self) -> EngineResult<Option<EngineRecord>> {
        self.0.step()
    }

    async fn close(&mut self) -> EngineResult<()> {
        self.0.end()
    }
}

struct InMemoryCallbackCursor(CursorState);

impl CallbackCursor for InMemoryCallbackCursor {
    fn next(&mut self, callback: NextCallback) {
        callback(self.0.step())
    }

    fn end(&mut self, callback: EndCallback) {
        callback(self.0.end())
    }
}

/// Injected failure that fires either once or on every call.
#[cfg(feature = "test-utils")]
#[derive(Clone)]
enum Failure {
    /// Error is returned once, then automatically cleared.
    Once(EngineError),
    /// Error is returned on every subsequent call until explicitly cleared.
    Persistent(EngineError),
}

#[cfg(feature = "test-utils")]
type FailSlot = arc_swap::ArcSwap<Option<Failure>>;

/// Checks a [`FailSlot`] and returns an error if one is set.
///
/// For [`Failure::Once`], the slot is atomically swapped to `None` so the
/// error fires exactly once. For [`Failure::Persistent`], the slot is left
/// unchanged.
#[cfg(feature = "test-utils")]
fn check_failure(slot: &FailSlot) -> EngineResult<()> {
    let guard = slot.load();
    match guard.as_ref() {
        None => Ok(()),
        Some(Failure::Persistent(err)) => Err(err.clone()),
        Some(Failure::Once(_)) => {
            let prev = slot.swap(Arc::new(None));
            match prev.as_ref() {
                Some(Failure::Once(err)) => Err(err.clone()),
                _ => Ok(()),
            }
        }
    }
}

/// An engine wrapper that delegates to an inner [`Engine`] but can inject
/// failures into `open`, `get`, writes and cursor steps on demand.
///
/// Failures can be *persistent* (returned on every call until cleared) or
/// *once* (returned on the next call, then automatically cleared).
///
/// Gated behind the `test-utils` feature.
///
/// # Example
///
/// ```ignore
/// let inner = Arc::new(InMemoryEngine::new());
/// let engine = FailingEngine::wrap(inner);
/// engine.fail_write(EngineError::Storage("disk full".into()));
/// // every put/delete/write call now returns Err(...)
///
/// engine.fail_next_once(EngineError::Storage("io error".into()));
/// // only the next cursor step returns Err(...), then auto-clears
/// ```
#[cfg(feature = "test-utils")]
pub struct FailingEngine {
    inner: Arc<dyn Engine>,
    fail_open: FailSlot,
    fail_get: FailSlot,
    fail_write: FailSlot,
    fail_next: Arc<FailSlot>,
}

#[cfg(feature = "test-utils")]
impl FailingEngine {
    /// Wraps an existing engine, with all failure injections initially `None`.
    pub fn wrap(inner: Arc<dyn Engine>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_open: arc_swap::ArcSwap::from_pointee(None),
            fail_get: arc_swap::ArcSwap::from_pointee(None),
            fail_write: arc_swap::ArcSwap::from_pointee(None),
            fail_next: Arc::new(arc_swap::ArcSwap::from_pointee(None)),
        })
    }

    /// Makes `open` return the given error on the next call only.
    pub fn fail_open_once(&self, err: EngineError) {
        self.fail_open.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `get` return the given error on every subsequent call.
    pub fn fail_get(&self, err: EngineError) {
        self.fail_get.store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `put`, `delete` and `write` return the given error on every subsequent call.
    pub fn fail_write(&self, err: EngineError) {
        self.fail_write
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `put`, `delete` or `write` return the given error on the next call only.
    pub fn fail_write_once(&self, err: EngineError) {
        self.fail_write.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes the next cursor step of any pull cursor return the given error.
    pub fn fail_next_once(&self, err: EngineError) {
        self.fail_next.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Clears every injected failure.
    pub fn clear(&self) {
        self.fail_open.store(Arc::new(None));
        self.fail_get.store(Arc::new(None));
        self.fail_write.store(Arc::new(None));
        self.fail_next.store(Arc::new(None));
    }
}

#[cfg(feature = "test-utils")]
struct FailingCursor {
    inner: Box<dyn PullCursor>,
    fail_next: Arc<FailSlot>,
}

#[cfg(feature = "test-utils")]
#[async_trait]
impl PullCursor for FailingCursor {
    async fn next(&mut self) -> EngineResult<Option<EngineRecord>> {
        check_failure(&self.fail_next)?;
        self.inner.next().await
    }

    async fn close(&mut self) -> EngineResult<()> {
        self.inner.close().await
    }
}

#[cfg(feature = "test-utils")]
#[async_trait]
impl Engine for FailingEngine {
    fn cursor_shape(&self) -> Option<CursorShape> {
        self.inner.cursor_shape()
    }

    async fn open(&self) -> EngineResult<()> {
        check_failure(&self.fail_open)?;
        self.inner.open().await
    }

    async fn close(&self) -> EngineResult<()> {
        self.inner.close().await
    }

    async fn get(&self, key: Bytes) -> EngineResult<Bytes> {
        check_failure(&self.fail_get)?;
        self.inner.get(key).await
    }

    async fn put(&self, key: Bytes, value: Bytes) -> EngineResult<()> {
        check_failure(&self.fail_write)?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: Bytes) -> EngineResult<()> {
        check_failure(&self.fail_write)?;
        self.inner.delete(key).await
    }

    async fn write(&self, ops: Vec<EngineOp>) -> EngineResult<()> {
        check_failure(&self.fail_write)?;
        self.inner.write(ops).await
    }

    async fn iterator(&self, options: IteratorOptions) -> EngineResult<NativeCursor> {
        match self.inner.iterator(options).await? {
            NativeCursor::Pull(inner) => Ok(NativeCursor::Pull(Box::new(FailingCursor {
                inner,
                fail_next: Arc::clone(&self.fail_next),
            }))),
            other => Ok(other),
        }
    }
}
