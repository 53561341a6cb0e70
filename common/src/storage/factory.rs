//! Engine factory for creating engine instances from configuration.
//!
//! This module provides factory functions for creating engines based on
//! configuration, supporting both InMemory and SlateDB backends.

use std::sync::Arc;

use slatedb::object_store::{self, ObjectStore};

use super::config::{EngineConfig, EngineOptions, ObjectStoreConfig};
use super::in_memory::InMemoryEngine;
use super::slate::SlateDbEngine;
use super::{Engine, EngineError, EngineResult};

/// Creates an object store from configuration without initializing SlateDB.
pub fn create_object_store(config: &ObjectStoreConfig) -> EngineResult<Arc<dyn ObjectStore>> {
    match config {
        ObjectStoreConfig::InMemory => Ok(Arc::new(object_store::memory::InMemory::new())),
        ObjectStoreConfig::Local(local_config) => {
            std::fs::create_dir_all(&local_config.path).map_err(|e| {
                EngineError::Storage(format!(
                    "Failed to create storage directory '{}': {}",
                    local_config.path, e
                ))
            })?;
            let store = object_store::local::LocalFileSystem::new_with_prefix(&local_config.path)
                .map_err(|e| {
                    EngineError::Storage(format!("Failed to create local filesystem store: {}", e))
                })?;
            Ok(Arc::new(store))
        }
    }
}

/// Creates an unopened engine based on the provided configuration.
///
/// `options` only affect engines with on-disk state; they are ignored for
/// the in-memory engine.
pub fn create_engine(config: &EngineConfig, options: EngineOptions) -> Arc<dyn Engine> {
    match config {
        EngineConfig::InMemory => Arc::new(InMemoryEngine::new()),
        EngineConfig::SlateDb(slate_config) => {
            Arc::new(SlateDbEngine::new(slate_config.clone(), options))
        }
    }
}
