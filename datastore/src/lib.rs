//! Level Datastore - a generic key-value datastore over an ordered embedded engine.
//!
//! Level Datastore exposes an ordered key-value engine (SlateDB, or any
//! [`Engine`](common::Engine) implementation) through a small uniform
//! interface: open/close, get/put/delete/has, atomic batches, and lazy
//! queries.
//!
//! # Architecture
//!
//! The store is a thin delegation layer. The interesting parts are:
//!
//! - **Range codec**: prefix queries become the engine range
//!   `[prefix, prefix ++ 0xFF)` so the engine does prefix matching natively.
//! - **Cursor adapter**: engine cursors are either pull-based or
//!   callback-based; both are bridged into one pull-based sequence that
//!   releases the native cursor on every exit path.
//! - **Query pipeline**: value stripping, filters, stable sorts, offset and
//!   limit composed in a fixed order over the cursor.
//!
//! # Key Concepts
//!
//! - **Key**: a canonical `/`-separated path, ordered byte-lexicographically.
//! - **Datastore**: the trait defining the operation surface.
//! - **LevelDatastore**: the engine-backed implementation.
//! - **Query**: an immutable query specification.
//! - **Batch**: writes committed atomically.
//!
//! # Example
//!
//! ```ignore
//! use datastore::{Config, Datastore, Key, LevelDatastore, Query, ValueOrder};
//! use bytes::Bytes;
//!
//! let store = LevelDatastore::new(Config::default())?;
//! store.open().await?;
//!
//! let mut batch = store.batch()?;
//! batch.put(Key::new("/x/1")?, Bytes::from_static(&[1]));
//! batch.put(Key::new("/x/2")?, Bytes::from_static(&[2]));
//! batch.commit().await?;
//!
//! let query = Query::builder()
//!     .prefix(Key::new("/x")?)
//!     .order_by(ValueOrder { descending: true })
//!     .limit(1)
//!     .build();
//! let mut iter = store.query(query).await?;
//! while let Some(pair) = iter.next().await? {
//!     println!("{}: {:?}", pair.key, pair.value);
//! }
//!
//! store.close().await?;
//! ```

mod batch;
mod config;
mod cursor;
mod datastore;
mod error;
mod key;
mod model;
mod pipeline;
mod query;

pub use batch::{Batch, BatchOp};
pub use config::{Config, Options};
pub use datastore::{Datastore, LevelDatastore};
pub use error::{Error, Result};
pub use key::Key;
pub use model::Pair;
pub use pipeline::{KeyIterator, QueryIterator};
pub use query::{
    DescendantFilter, KeyOrder, Query, QueryBuilder, QueryFilter, QueryOrder, ValueOrder,
};
