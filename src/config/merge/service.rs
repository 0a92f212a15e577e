//! MergeService: stacks the config sources and deserializes the result into SyncConfig.

use crate::config::sources::{environment, global_file, workspace_file};
use crate::config::SyncConfig;
use config::{Config, ConfigError, File};
use std::path::Path;
use tracing::debug;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Precedence: global file (lowest) -> workspace file -> environment (highest).
    /// Missing keys fall back to `SyncConfig::default()` through `serde(default)`.
    pub fn load(workspace_root: &Path) -> Result<SyncConfig, ConfigError> {
        let builder = Config::builder();
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder)?;

        let config: SyncConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load one explicit file (required) plus the environment overlay.
    pub fn load_from_file(path: &Path) -> Result<SyncConfig, ConfigError> {
        let builder = Config::builder().add_source(File::from(path).required(true));
        let builder = environment::add_to_builder(builder)?;
        builder.build()?.try_deserialize()
    }
}
