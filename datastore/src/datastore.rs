//! The [`Datastore`] trait and its engine-backed implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use common::{Engine, EngineError, IteratorOptions, create_engine};
use tokio::sync::Mutex;

use crate::batch::Batch;
use crate::config::Config;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::pipeline::{KeyIterator, QueryIterator};
use crate::query::Query;

/// A generic key-value datastore.
///
/// # Example
///
/// ```ignore
/// use datastore::{Datastore, Key, LevelDatastore, Query};
/// use bytes::Bytes;
///
/// let store = LevelDatastore::new(config)?;
/// store.open().await?;
///
/// store.put(&Key::new("/x/1")?, Bytes::from_static(&[1])).await?;
/// let value = store.get(&Key::new("/x/1")?).await?;
///
/// let query = Query::builder().prefix(Key::new("/x")?).build();
/// let mut iter = store.query(query).await?;
/// while let Some(pair) = iter.next().await? {
///     println!("{}: {:?}", pair.key, pair.value);
/// }
///
/// store.close().await?;
/// ```
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Opens the store. A failed open leaves the store unopened.
    async fn open(&self) -> Result<()>;

    /// Closes the store. Closing a closed or never-opened store is a no-op.
    async fn close(&self) -> Result<()>;

    /// Stores `value` under `key`, overwriting any existing value.
    async fn put(&self, key: &Key, value: Bytes) -> Result<()>;

    /// Returns the value under `key`, or [`Error::NotFound`].
    async fn get(&self, key: &Key) -> Result<Bytes>;

    /// Returns whether `key` exists.
    async fn has(&self, key: &Key) -> Result<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Deletes `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &Key) -> Result<()>;

    /// Starts a new write batch.
    fn batch(&self) -> Result<Batch>;

    /// Runs `query`, returning a lazy iterator over matching pairs.
    async fn query(&self, query: Query) -> Result<QueryIterator>;

    /// Runs `query`, returning a lazy iterator over matching keys.
    async fn query_keys(&self, query: Query) -> Result<KeyIterator>;

    /// Stores every pair in one atomic batch.
    async fn put_many(&self, pairs: Vec<(Key, Bytes)>) -> Result<()> {
        let mut batch = self.batch()?;
        for (key, value) in pairs {
            batch.put(key, value);
        }
        batch.commit().await
    }

    /// Returns the values of every key, in order. Fails on the first missing key.
    async fn get_many(&self, keys: &[Key]) -> Result<Vec<Bytes>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Deletes every key in one atomic batch.
    async fn delete_many(&self, keys: &[Key]) -> Result<()> {
        let mut batch = self.batch()?;
        for key in keys {
            batch.delete(key.clone());
        }
        batch.commit().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreState {
    Unopened,
    Open,
    Closed,
}

/// State shared between the store and the batches it hands out.
pub(crate) struct Shared {
    pub(crate) engine: Arc<dyn Engine>,
    state: RwLock<StoreState>,
    /// Serializes open/close transitions.
    transition: Mutex<()>,
}

impl Shared {
    fn state(&self) -> Result<StoreState> {
        self.state
            .read()
            .map(|state| *state)
            .map_err(|e| Error::Internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn set_state(&self, next: StoreState) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| Error::Internal(format!("Failed to acquire write lock: {}", e)))?;
        *state = next;
        Ok(())
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.state()? {
            StoreState::Open => Ok(()),
            StoreState::Unopened | StoreState::Closed => Err(Error::NotOpen),
        }
    }
}

/// A [`Datastore`] backed by an ordered embedded engine.
///
/// Keys are stored under their canonical bytes; values are opaque. Prefix
/// queries are bounded by the engine itself using the range
/// `[prefix, prefix ++ 0xFF)`.
///
/// `LevelDatastore` is cheap to clone; clones share the same engine handle
/// and lifecycle.
#[derive(Clone)]
pub struct LevelDatastore {
    shared: Arc<Shared>,
}

impl LevelDatastore {
    /// Creates an unopened store on the engine described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCursor`] if the engine cannot hand out
    /// range-scan cursors.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_engine(create_engine(&config.engine, config.options))
    }

    /// Creates an unopened store on an already constructed engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCursor`] if the engine cannot hand out
    /// range-scan cursors.
    pub fn with_engine(engine: Arc<dyn Engine>) -> Result<Self> {
        let Some(shape) = engine.cursor_shape() else {
            return Err(Error::UnsupportedCursor(
                "engine exposes neither pull nor callback cursors".to_string(),
            ));
        };
        tracing::debug!(cursor_shape = %shape, "created datastore");
        Ok(Self {
            shared: Arc::new(Shared {
                engine,
                state: RwLock::new(StoreState::Unopened),
                transition: Mutex::new(()),
            }),
        })
    }

    /// The engine this store delegates to.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.shared.engine
    }

    pub fn is_open(&self) -> bool {
        self.shared.ensure_open().is_ok()
    }

    async fn open_cursor(&self, query: &Query) -> Result<Cursor> {
        self.shared.ensure_open()?;
        let options = IteratorOptions {
            range: query
                .prefix()
                .map(Key::range)
                .unwrap_or_default(),
            values: query.needs_values(),
        };
        Cursor::open(self.shared.engine.as_ref(), options).await
    }
}

#[async_trait]
impl Datastore for LevelDatastore {
    async fn open(&self) -> Result<()> {
        let _transition = self.shared.transition.lock().await;
        match self.shared.state()? {
            StoreState::Open => return Ok(()),
            StoreState::Closed => {
                return Err(Error::OpenFailed("datastore has been closed".to_string()));
            }
            StoreState::Unopened => {}
        }
        self.shared
            .engine
            .open()
            .await
            .map_err(|e| Error::OpenFailed(e.to_string()))?;
        self.shared.set_state(StoreState::Open)?;
        tracing::debug!("opened datastore");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let _transition = self.shared.transition.lock().await;
        if self.shared.state()? != StoreState::Open {
            return Ok(());
        }
        self.shared
            .engine
            .close()
            .await
            .map_err(|e| Error::CloseFailed(e.to_string()))?;
        self.shared.set_state(StoreState::Closed)?;
        tracing::debug!("closed datastore");
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all, fields(key = %key))]
    async fn put(&self, key: &Key, value: Bytes) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared
            .engine
            .put(key.to_bytes(), value)
            .await
            .map_err(|e| Error::WriteFailed(e.to_string()))
    }

    #[tracing::instrument(level = "trace", skip_all, fields(key = %key))]
    async fn get(&self, key: &Key) -> Result<Bytes> {
        self.shared.ensure_open()?;
        self.shared
            .engine
            .get(key.to_bytes())
            .await
            .map_err(|e| match e {
                EngineError::NotFound => Error::NotFound(key.to_string()),
                other => Error::ReadFailed(other.to_string()),
            })
    }

    #[tracing::instrument(level = "trace", skip_all, fields(key = %key))]
    async fn delete(&self, key: &Key) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared
            .engine
            .delete(key.to_bytes())
            .await
            .map_err(|e| Error::DeleteFailed(e.to_string()))
    }

    fn batch(&self) -> Result<Batch> {
        self.shared.ensure_open()?;
        Ok(Batch::new(Arc::clone(&self.shared)))
    }

    #[tracing::instrument(level = "trace", skip_all, fields(query = ?query))]
    async fn query(&self, query: Query) -> Result<QueryIterator> {
        let cursor = self.open_cursor(&query).await?;
        Ok(QueryIterator::new(cursor, query))
    }

    async fn query_keys(&self, query: Query) -> Result<KeyIterator> {
        let query = query.into_keys_only();
        Ok(KeyIterator::new(self.query(query).await?))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use common::storage::in_memory::InMemoryEngine;
    use common::storage::{CursorShape, EngineOp, EngineResult, NativeCursor};

    use super::*;

    async fn open_store() -> LevelDatastore {
        let store = LevelDatastore::with_engine(Arc::new(InMemoryEngine::new())).unwrap();
        store.open().await.unwrap();
        store
    }

    fn key(s: &str) -> Key {
        Key::new(s).unwrap()
    }

    #[tokio::test]
    async fn should_put_and_get_value() {
        // given
        let store = open_store().await;

        // when
        store.put(&key("/a"), Bytes::from("1")).await.unwrap();
        let result = store.get(&key("/a")).await.unwrap();

        // then
        assert_eq!(result, Bytes::from("1"));
    }

    #[tokio::test]
    async fn should_distinguish_missing_from_present() {
        // given
        let store = open_store().await;
        store.put(&key("/a"), Bytes::from("1")).await.unwrap();

        // when
        let missing = store.get(&key("/b")).await;

        // then
        assert_eq!(missing, Err(Error::NotFound("/b".to_string())));
        assert!(!store.has(&key("/b")).await.unwrap());
        assert!(store.has(&key("/a")).await.unwrap());
    }

    #[tokio::test]
    async fn should_delete_absent_key_without_error() {
        let store = open_store().await;

        let result = store.delete(&key("/nope")).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn should_reject_operations_when_not_open() {
        // given
        let store = LevelDatastore::with_engine(Arc::new(InMemoryEngine::new())).unwrap();

        // then
        assert_eq!(store.get(&key("/a")).await, Err(Error::NotOpen));
        assert_eq!(
            store.put(&key("/a"), Bytes::new()).await,
            Err(Error::NotOpen)
        );
        assert_eq!(store.has(&key("/a")).await, Err(Error::NotOpen));
        assert!(matches!(store.batch(), Err(Error::NotOpen)));
        assert!(matches!(store.query(Query::all()).await, Err(Error::NotOpen)));
    }

    #[tokio::test]
    async fn should_move_through_lifecycle() {
        // given
        let store = LevelDatastore::with_engine(Arc::new(InMemoryEngine::new())).unwrap();
        store.close().await.unwrap();

        // when
        store.open().await.unwrap();
        store.open().await.unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();

        // then
        assert!(!store.is_open());
        assert!(matches!(store.open().await, Err(Error::OpenFailed(_))));
        assert_eq!(store.get(&key("/a")).await, Err(Error::NotOpen));
    }

    #[tokio::test]
    async fn should_fail_commit_after_close() {
        // given
        let store = open_store().await;
        let mut batch = store.batch().unwrap();
        batch.put(key("/a"), Bytes::from("1"));
        store.close().await.unwrap();

        // when
        let result = batch.commit().await;

        // then
        assert_eq!(result, Err(Error::NotOpen));
    }

    #[tokio::test]
    async fn should_commit_batch_in_append_order() {
        // given
        let store = open_store().await;
        store.put(&key("/b"), Bytes::from("old")).await.unwrap();
        let mut batch = store.batch().unwrap();
        batch.put(key("/a"), Bytes::from("1"));
        batch.delete(key("/b"));
        batch.put(key("/c"), Bytes::from("2"));
        batch.put(key("/a"), Bytes::from("3"));

        // when
        assert!(!store.has(&key("/a")).await.unwrap());
        batch.commit().await.unwrap();

        // then
        assert_eq!(store.get(&key("/a")).await.unwrap(), Bytes::from("3"));
        assert!(!store.has(&key("/b")).await.unwrap());
        assert_eq!(store.get(&key("/c")).await.unwrap(), Bytes::from("2"));
    }

    #[tokio::test]
    async fn should_put_get_and_delete_many() {
        // given
        let store = open_store().await;
        let keys = vec![key("/a"), key("/b")];

        // when
        store
            .put_many(vec![
                (key("/a"), Bytes::from("1")),
                (key("/b"), Bytes::from("2")),
            ])
            .await
            .unwrap();
        let values = store.get_many(&keys).await.unwrap();
        store.delete_many(&keys).await.unwrap();

        // then
        assert_eq!(values, vec![Bytes::from("1"), Bytes::from("2")]);
        assert!(!store.has(&key("/a")).await.unwrap());
        assert!(!store.has(&key("/b")).await.unwrap());
    }

    #[tokio::test]
    async fn should_query_keys_without_values() {
        // given
        let store = open_store().await;
        store.put(&key("/x/1"), Bytes::from("1")).await.unwrap();
        store.put(&key("/y/1"), Bytes::from("2")).await.unwrap();

        // when
        let keys = store
            .query_keys(Query::builder().prefix(key("/x")).build())
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();

        // then
        assert_eq!(keys, vec![key("/x/1")]);
    }

    /// An engine that cannot hand out cursors.
    struct NoCursorEngine;

    #[async_trait]
    impl Engine for NoCursorEngine {
        fn cursor_shape(&self) -> Option<CursorShape> {
            None
        }

        async fn open(&self) -> EngineResult<()> {
            Ok(())
        }

        async fn close(&self) -> EngineResult<()> {
            Ok(())
        }

        async fn get(&self, _key: Bytes) -> EngineResult<Bytes> {
            Err(EngineError::NotFound)
        }

        async fn put(&self, _key: Bytes, _value: Bytes) -> EngineResult<()> {
            Ok(())
        }

        async fn delete(&self, _key: Bytes) -> EngineResult<()> {
            Ok(())
        }

        async fn write(&self, _ops: Vec<EngineOp>) -> EngineResult<()> {
            Ok(())
        }

        async fn iterator(&self, _options: IteratorOptions) -> EngineResult<NativeCursor> {
            Err(EngineError::Internal("no cursors".to_string()))
        }
    }

    #[test]
    fn should_fail_fast_on_engine_without_cursors() {
        let result = LevelDatastore::with_engine(Arc::new(NoCursorEngine));

        assert!(matches!(result, Err(Error::UnsupportedCursor(_))));
    }
}
