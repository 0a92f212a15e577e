//! Configuration
//!
//! Layered with the `config` crate. Precedence, lowest to highest: built-in defaults,
//! the global file (`$XDG_CONFIG_HOME/manifest-sync/config.toml`), the workspace file
//! (`<root>/.manifest-sync.toml`), then `MANIFEST_SYNC__SECTION__KEY` environment
//! variables.

pub mod facade;
pub mod merge {
    pub mod service;
}
pub mod paths {
    pub mod xdg_root;
}
pub mod sources {
    pub mod environment;
    pub mod global_file;
    pub mod workspace_file;
}

pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;

use crate::error::ApiError;
use crate::extract::ExtractionConfig;
use crate::logging::LoggingConfig;
use crate::preview::PreviewConfig;
use crate::store::ReferenceConfig;
use crate::tree::ScanConfig;
use crate::watch::WatchConfig;
use serde::{Deserialize, Serialize};

/// Complete configuration of a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub scan: ScanConfig,
    pub extraction: ExtractionConfig,
    pub references: ReferenceConfig,
    pub preview: PreviewConfig,
    pub watch: WatchConfig,
    pub logging: LoggingConfig,
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        self.scan.validate()?;
        if self.extraction.kind_field.is_empty() || self.extraction.api_version_field.is_empty() {
            return Err(ApiError::ConfigError(
                "extraction field names cannot be empty".to_string(),
            ));
        }
        self.references.validate()?;
        self.preview.validate()?;
        self.watch.validate()?;
        Ok(())
    }
}
