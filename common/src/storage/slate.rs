//! SlateDB-backed engine.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use slatedb::config::{CompressionCodec, Settings};
use slatedb::{Db, DbBuilder, DbIterator, WriteBatch};
use tokio::sync::RwLock;

use super::config::{EngineOptions, ObjectStoreConfig, SlateDbEngineConfig};
use super::factory::create_object_store;
use super::{
    CursorShape, Engine, EngineError, EngineOp, EngineRecord, EngineResult, IteratorOptions,
    NativeCursor, PullCursor,
};

/// An [`Engine`] over a SlateDB database.
///
/// The database handle is created on [`Engine::open`] and released on
/// [`Engine::close`]; every other operation fails while no handle is held.
pub struct SlateDbEngine {
    config: SlateDbEngineConfig,
    options: EngineOptions,
    db: RwLock<Option<Arc<Db>>>,
}

impl SlateDbEngine {
    pub fn new(config: SlateDbEngineConfig, options: EngineOptions) -> Self {
        Self {
            config,
            options,
            db: RwLock::new(None),
        }
    }

    async fn handle(&self) -> EngineResult<Arc<Db>> {
        self.db
            .read()
            .await
            .clone()
            .ok_or_else(|| EngineError::Storage("engine is not open".to_string()))
    }

    /// Applies `create_if_missing` / `error_if_exists` to a local data directory.
    fn check_local_path(&self, root: &str) -> EngineResult<()> {
        let dir = Path::new(root).join(&self.config.path);
        let exists = dir.is_dir()
            && std::fs::read_dir(&dir)
                .map_err(|e| {
                    EngineError::Storage(format!("Failed to read '{}': {}", dir.display(), e))
                })?
                .next()
                .is_some();

        if exists && self.options.error_if_exists {
            return Err(EngineError::Storage(format!(
                "database '{}' already exists (error_if_exists is set)",
                dir.display()
            )));
        }
        if !exists && !self.options.create_if_missing {
            return Err(EngineError::Storage(format!(
                "database '{}' does not exist (create_if_missing is false)",
                dir.display()
            )));
        }
        Ok(())
    }

    fn settings(&self) -> EngineResult<Settings> {
        let mut settings = match &self.config.settings_path {
            Some(path) => Settings::from_file(path).map_err(|e| {
                EngineError::Storage(format!(
                    "Failed to load SlateDB settings from {}: {}",
                    path, e
                ))
            })?,
            None => Settings::default(),
        };
        settings.compression_codec = self.options.compression.then_some(CompressionCodec::Snappy);
        Ok(settings)
    }
}

#[async_trait]
impl Engine for SlateDbEngine {
    fn cursor_shape(&self) -> Option<CursorShape> {
        Some(CursorShape::Pull)
    }

    async fn open(&self) -> EngineResult<()> {
        let mut guard = self.db.write().await;
        if guard.is_some() {
            return Ok(());
        }

        if let ObjectStoreConfig::Local(local) = &self.config.object_store {
            self.check_local_path(&local.path)?;
        }

        let object_store = create_object_store(&self.config.object_store)?;
        let db = DbBuilder::new(self.config.path.clone(), object_store)
            .with_settings(self.settings()?)
            .build()
            .await
            .map_err(|e| EngineError::Storage(format!("Failed to open SlateDB: {}", e)))?;

        tracing::debug!(path = %self.config.path, "opened slatedb engine");
        *guard = Some(Arc::new(db));
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        let Some(db) = self.db.write().await.take() else {
            return Ok(());
        };
        db.close().await.map_err(EngineError::from_storage)?;
        tracing::debug!(path = %self.config.path, "closed slatedb engine");
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> EngineResult<Bytes> {
        let db = self.handle().await?;
        db.get(&key)
            .await
            .map_err(EngineError::from_storage)?
            .ok_or(EngineError::NotFound)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn put(&self, key: Bytes, value: Bytes) -> EngineResult<()> {
        let db = self.handle().await?;
        db.put(&key, &value).await.map_err(EngineError::from_storage)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn delete(&self, key: Bytes) -> EngineResult<()> {
        let db = self.handle().await?;
        db.delete(&key).await.map_err(EngineError::from_storage)
    }

    /// All operations are written together in a single `WriteBatch`.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn write(&self, ops: Vec<EngineOp>) -> EngineResult<()> {
        let db = self.handle().await?;
        let mut batch = WriteBatch::new();
        for op in ops {
            match op {
                EngineOp::Put(key, value) => batch.put(&key, &value),
                EngineOp::Delete(key) => batch.delete(&key),
            }
        }
        db.write(batch).await.map_err(EngineError::from_storage)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn iterator(&self, options: IteratorOptions) -> EngineResult<NativeCursor> {
        let db = self.handle().await?;
        let iter = db
            .scan(options.range)
            .await
            .map_err(EngineError::from_storage)?;
        Ok(NativeCursor::Pull(Box::new(SlateDbCursor {
            inner: Some(iter),
            values: options.values,
        })))
    }
}

struct SlateDbCursor {
    inner: Option<DbIterator>,
    values: bool,
}

#[async_trait]
impl PullCursor for SlateDbCursor {
    async fn next(&mut self) -> EngineResult<Option<EngineRecord>> {
        let Some(iter) = self.inner.as_mut() else {
            return Err(EngineError::Storage("cursor has already ended".to_string()));
        };
        let kv = iter.next().await.map_err(EngineError::from_storage)?;
        Ok(kv.map(|kv| EngineRecord {
            key: kv.key,
            value: self.values.then_some(kv.value),
        }))
    }

    async fn close(&mut self) -> EngineResult<()> {
        match self.inner.take() {
            Some(_) => Ok(()),
            None => Err(EngineError::Storage("end() called twice".to_string())),
        }
    }
}
