//! Storage-engine abstraction shared by the datastore crates.
//!
//! An [`Engine`] is an ordered embedded key-value store offering point
//! reads and writes, atomic multi-operation writes, and range-scan cursors.
//! Cursors come in two call conventions, see [`NativeCursor`].

pub mod bytes;
pub mod storage;

pub use bytes::BytesRange;
pub use storage::config::{EngineConfig, EngineOptions};
pub use storage::factory::create_engine;
pub use storage::{
    CallbackCursor, CursorShape, Engine, EngineError, EngineOp, EngineRecord, EngineResult,
    IteratorOptions, NativeCursor, PullCursor,
};
