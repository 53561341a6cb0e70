//! Configuration for opening a [`LevelDatastore`](crate::LevelDatastore).

use common::{EngineConfig, EngineOptions};

/// Engine tuning options recognized at construction.
///
/// Defaults: `create_if_missing = true`, `error_if_exists = false`,
/// `compression = false`.
pub type Options = EngineOptions;

/// Configuration for a path-based [`LevelDatastore`](crate::LevelDatastore).
///
/// To run on an engine that is already constructed, use
/// [`LevelDatastore::with_engine`](crate::LevelDatastore::with_engine) instead.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Engine backend configuration.
    pub engine: EngineConfig,
    /// Engine tuning options.
    pub options: Options,
}
