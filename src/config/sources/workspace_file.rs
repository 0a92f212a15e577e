//! Workspace config file: <root>/.manifest-sync.toml

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use std::path::{Path, PathBuf};

pub const WORKSPACE_CONFIG_FILE: &str = ".manifest-sync.toml";

pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(WORKSPACE_CONFIG_FILE)
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let path = workspace_config_path(workspace_root);
    // The leading dot hides the extension from format detection.
    Ok(builder.add_source(
        File::from(path)
            .format(FileFormat::Toml)
            .required(false),
    ))
}
