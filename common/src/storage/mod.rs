pub mod config;
pub mod factory;
pub mod in_memory;
pub mod slate;

use async_trait::async_trait;
use bytes::Bytes;

use crate::BytesRange;

/// A raw key/value pair as produced by an engine cursor.
///
/// `value` is `None` when the cursor was opened with `values: false`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineRecord {
    pub key: Bytes,
    pub value: Option<Bytes>,
}

impl EngineRecord {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self {
            key,
            value: Some(value),
        }
    }

    pub fn key_only(key: Bytes) -> Self {
        Self { key, value: None }
    }
}

/// A single write in an atomic [`Engine::write`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineOp {
    Put(Bytes, Bytes),
    Delete(Bytes),
}

/// Options for opening an engine cursor.
#[derive(Clone, Debug)]
pub struct IteratorOptions {
    /// Byte range to scan. Bounds are applied by the engine.
    pub range: BytesRange,
    /// Whether the cursor should fetch values. Keys are always returned.
    pub values: bool,
}

impl Default for IteratorOptions {
    fn default() -> Self {
        Self {
            range: BytesRange::unbounded(),
            values: true,
        }
    }
}

/// Error type for engine operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The requested key does not exist.
    NotFound,
    /// Storage-related errors
    Storage(String),
    /// Internal errors
    Internal(String),
}

impl std::error::Error for EngineError {}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EngineError::NotFound => write!(f, "Key not found"),
            EngineError::Storage(msg) => write!(f, "Storage error: {}", msg),
            EngineError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl EngineError {
    /// Converts an engine-specific error to EngineError::Storage.
    pub fn from_storage(e: impl std::fmt::Display) -> Self {
        EngineError::Storage(e.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound)
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// A pull-based cursor over an engine range scan.
///
/// `close` must be called exactly once before the cursor is dropped.
#[async_trait]
pub trait PullCursor: Send {
    /// Returns the next record, or `None` once the range is exhausted.
    async fn next(&mut self) -> EngineResult<Option<EngineRecord>>;

    /// Releases the native cursor.
    async fn close(&mut self) -> EngineResult<()>;
}

/// Callback invoked with the outcome of [`CallbackCursor::next`].
pub type NextCallback = Box<dyn FnOnce(EngineResult<Option<EngineRecord>>) + Send>;

/// Callback invoked with the outcome of [`CallbackCursor::end`].
pub type EndCallback = Box<dyn FnOnce(EngineResult<()>) + Send>;

/// A push-based cursor that reports each step through a callback.
///
/// `next` delivers `Ok(None)` at the end of the range. `end` releases the
/// native cursor and must be called exactly once.
pub trait CallbackCursor: Send {
    fn next(&mut self, callback: NextCallback);

    fn end(&mut self, callback: EndCallback);
}

/// The native cursor handed out by an engine, tagged by call convention.
pub enum NativeCursor {
    Pull(Box<dyn PullCursor>),
    Callback(Box<dyn CallbackCursor>),
}

impl NativeCursor {
    pub fn shape(&self) -> CursorShape {
        match self {
            NativeCursor::Pull(_) => CursorShape::Pull,
            NativeCursor::Callback(_) => CursorShape::Callback,
        }
    }
}

/// Cursor call conventions an engine can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorShape {
    Pull,
    Callback,
}

impl std::fmt::Display for CursorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CursorShape::Pull => write!(f, "pull"),
            CursorShape::Callback => write!(f, "callback"),
        }
    }
}

/// An ordered embedded key-value engine.
///
/// Keys are compared byte-lexicographically. Implementations own durability,
/// compaction and serialization of physical access.
#[async_trait]
pub trait Engine: Send + Sync {
    /// The cursor convention this engine hands out, or `None` if it cannot
    /// produce range-scan cursors at all.
    fn cursor_shape(&self) -> Option<CursorShape>;

    /// Opens the engine. Must be called before any other operation.
    async fn open(&self) -> EngineResult<()>;

    /// Closes the engine, releasing any resources.
    async fn close(&self) -> EngineResult<()>;

    /// Returns the value for `key`, or [`EngineError::NotFound`].
    async fn get(&self, key: Bytes) -> EngineResult<Bytes>;

    async fn put(&self, key: Bytes, value: Bytes) -> EngineResult<()>;

    /// Deletes `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: Bytes) -> EngineResult<()>;

    /// Applies all operations atomically, in order.
    async fn write(&self, ops: Vec<EngineOp>) -> EngineResult<()>;

    /// Opens a cursor over `options.range` in ascending key order.
    async fn iterator(&self, options: IteratorOptions) -> EngineResult<NativeCursor>;
}
