//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Selects the engine a datastore is built on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineConfig {
    #[default]
    InMemory,
    SlateDb(SlateDbEngineConfig),
}

/// Configuration for a SlateDB-backed engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlateDbEngineConfig {
    /// Database path within the object store.
    pub path: String,
    pub object_store: ObjectStoreConfig,
    /// Optional SlateDB settings file. Defaults are used when absent.
    #[serde(default)]
    pub settings_path: Option<String>,
}

/// Object store backing a SlateDB engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectStoreConfig {
    InMemory,
    Local(LocalObjectStoreConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalObjectStoreConfig {
    /// Root directory on the local filesystem.
    pub path: String,
}

/// Tuning options applied when an engine is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Create the database if it does not exist. Default: true.
    pub create_if_missing: bool,
    /// Fail to open if the database already exists. Default: false.
    pub error_if_exists: bool,
    /// Compress stored blocks. Default: false, matching other implementations
    /// of the same datastore so on-disk data stays interchangeable.
    pub compression: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            compression: false,
        }
    }
}
