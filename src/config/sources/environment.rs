//! Environment variable source: MANIFEST_SYNC__ prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

pub const ENV_PREFIX: &str = "MANIFEST_SYNC";

/// Add the environment overlay to the builder.
///
/// `MANIFEST_SYNC__WATCH__DEBOUNCE_MS=250` sets `watch.debounce_ms`. List-valued keys take
/// comma-separated values.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("scan.ignore_patterns")
            .with_list_parse_key("scan.resource_extensions")
            .with_list_parse_key("preview.kustomize_command")
            .with_list_parse_key("preview.helm_command")
            .with_list_parse_key("preview.cluster_command"),
    );
    Ok(builder)
}
