//! Logging
//!
//! Structured logging on `tracing`. Level, format and destination come from
//! [`LoggingConfig`] and can be overridden through `MANIFEST_SYNC_LOG*` environment
//! variables.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const ENV_FILTER: &str = "MANIFEST_SYNC_LOG";
const ENV_FORMAT: &str = "MANIFEST_SYNC_LOG_FORMAT";
const ENV_OUTPUT: &str = "MANIFEST_SYNC_LOG_OUTPUT";
const ENV_FILE: &str = "MANIFEST_SYNC_LOG_FILE";
const ENV_MODULES: &str = "MANIFEST_SYNC_LOG_MODULES";

const LOG_FILE_NAME: &str = "manifest-sync.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ApiError::ConfigError(format!(
                "Invalid log format: {} (must be 'json' or 'text')",
                other
            ))),
        }
    }
}

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOutput {
    #[serde(rename = "stdout")]
    Stdout,
    #[serde(rename = "stderr")]
    Stderr,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "file+stderr")]
    FileAndStderr,
    /// stdout and stderr
    #[serde(rename = "both")]
    Both,
}

impl LogOutput {
    fn to_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::FileAndStderr)
    }

    fn is_terminal(self) -> bool {
        !self.to_file()
    }
}

impl FromStr for LogOutput {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "file" => Ok(LogOutput::File),
            "file+stderr" => Ok(LogOutput::FileAndStderr),
            "both" => Ok(LogOutput::Both),
            other => Err(ApiError::ConfigError(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr', 'file', 'file+stderr', or 'both')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// trace, debug, info, warn, error or off
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log file when `output` includes a file; defaults to the platform state directory
    pub file: Option<PathBuf>,
    /// ANSI colors for terminal output
    pub color: bool,
    /// Per-module levels, e.g. `manifest_sync::watch = "debug"`
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Text,
            output: LogOutput::Stderr,
            file: None,
            color: true,
            modules: BTreeMap::new(),
        }
    }
}

/// Log file path. Precedence: explicit path, `MANIFEST_SYNC_LOG_FILE`, configured file,
/// platform default (scoped under the workspace path when one is given).
pub fn resolve_log_file_path(
    explicit: Option<PathBuf>,
    configured: Option<PathBuf>,
    workspace: Option<&Path>,
) -> Result<PathBuf, ApiError> {
    let env = std::env::var(ENV_FILE).ok().map(PathBuf::from);
    let chosen = [explicit, env, configured]
        .into_iter()
        .flatten()
        .find(|p| !p.as_os_str().is_empty());
    match chosen {
        Some(path) => Ok(path),
        None => default_log_file_path(workspace),
    }
}

fn default_log_file_path(workspace: Option<&Path>) -> Result<PathBuf, ApiError> {
    let dirs = directories::ProjectDirs::from("", "", "manifest-sync").ok_or_else(|| {
        ApiError::ConfigError("Could not determine platform directories for log file".to_string())
    })?;
    let mut dir = dirs
        .state_dir()
        .unwrap_or_else(|| dirs.data_local_dir())
        .to_path_buf();
    if let Some(workspace) = workspace {
        let canonical = dunce::canonicalize(workspace).map_err(|e| {
            ApiError::ConfigError(format!("Failed to canonicalize workspace path: {}", e))
        })?;
        for component in canonical.components() {
            if let std::path::Component::Normal(name) = component {
                dir.push(name);
            }
        }
    }
    Ok(dir.join(LOG_FILE_NAME))
}

fn open_log_file(path: &Path) -> Result<std::fs::File, ApiError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ApiError::ConfigError(format!("Failed to create log directory: {}", e)))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ApiError::ConfigError(format!("Failed to open log file {:?}: {}", path, e)))
}

fn make_writer(output: LogOutput, file: Option<&Path>) -> Result<BoxMakeWriter, ApiError> {
    let writer = match output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::Both => BoxMakeWriter::new(std::io::stdout.and(std::io::stderr)),
        LogOutput::File | LogOutput::FileAndStderr => {
            let path = file.ok_or_else(|| {
                ApiError::ConfigError("Log file path could not be resolved".to_string())
            })?;
            let handle = open_log_file(path)?;
            if output == LogOutput::FileAndStderr {
                BoxMakeWriter::new(std::sync::Mutex::new(handle).and(std::io::stderr))
            } else {
                BoxMakeWriter::new(std::sync::Mutex::new(handle))
            }
        }
    };
    Ok(writer)
}

/// Install the global subscriber.
///
/// Fails if the configuration is invalid or a subscriber is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    if !config.enabled {
        return Registry::default()
            .with(EnvFilter::new("off"))
            .try_init()
            .map_err(|e| ApiError::ConfigError(format!("Failed to install logger: {}", e)));
    }

    let filter = build_env_filter(config)?;
    let format = match std::env::var(ENV_FORMAT) {
        Ok(value) => value.parse()?,
        Err(_) => config.format,
    };
    let output = match std::env::var(ENV_OUTPUT) {
        Ok(value) => value.parse()?,
        Err(_) => config.output,
    };
    let file = if output.to_file() {
        Some(resolve_log_file_path(None, config.file.clone(), None)?)
    } else {
        None
    };
    let writer = make_writer(output, file.as_deref())?;
    let ansi = config.color && output.is_terminal() && format == LogFormat::Text;

    let layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(ansi)
        .with_writer(writer);
    let installed = match format {
        LogFormat::Json => Registry::default().with(filter).with(layer.json()).try_init(),
        LogFormat::Text => Registry::default().with(filter).with(layer).try_init(),
    };
    installed.map_err(|e| ApiError::ConfigError(format!("Failed to install logger: {}", e)))
}

fn parse_directive(
    module: &str,
    level: &str,
) -> Result<tracing_subscriber::filter::Directive, ApiError> {
    format!("{}={}", module.trim(), level.trim())
        .parse()
        .map_err(|e| ApiError::ConfigError(format!("Invalid log directive for {}: {}", module, e)))
}

/// `MANIFEST_SYNC_LOG` wins outright; otherwise the configured level plus per-module
/// directives from the config and `MANIFEST_SYNC_LOG_MODULES` (`a=debug,b=warn`).
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env(ENV_FILTER) {
        return Ok(filter);
    }
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(&config.level);
    for (module, level) in &config.modules {
        filter = filter.add_directive(parse_directive(module, level)?);
    }
    if let Ok(modules) = std::env::var(ENV_MODULES) {
        for spec in modules.split(',') {
            if let Some((module, level)) = spec.split_once('=') {
                filter = filter.add_directive(parse_directive(module, level)?);
            }
        }
    }
    Ok(filter)
}
