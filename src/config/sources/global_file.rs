//! Global config file: $XDG_CONFIG_HOME/manifest-sync/config.toml

use crate::config::xdg;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};

/// Add the global file when one can be located; it is optional.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match xdg::global_config_file() {
        Ok(path) => Ok(builder.add_source(File::from(path).required(false))),
        Err(_) => Ok(builder),
    }
}
