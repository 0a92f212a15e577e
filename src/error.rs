//! Error types for the synchronization core.

use crate::types::ResourceId;
use std::path::PathBuf;
use thiserror::Error;

/// Storage I/O errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path not found: {0:?}")]
    NotFound(PathBuf),

    #[error("File is not valid UTF-8: {0:?}")]
    NotUtf8(PathBuf),
}

/// A document that could not be turned into a resource
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[error("document {doc_index} (line {line}): {message}")]
pub struct ExtractionError {
    pub doc_index: usize,
    pub line: usize,
    pub message: String,
}

/// Errors surfaced by pipeline operations
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Could not find root folder")]
    RootNotFound,

    #[error("Path not in tree: {0}")]
    PathNotInTree(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(ResourceId),

    #[error("Helm values file not found: {0}")]
    HelmValuesNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid {preview_type} preview target: {target}")]
    InvalidPreviewTarget { preview_type: String, target: String },

    #[error("Preview failed: {0}")]
    PreviewFailed(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Project runtime has stopped")]
    RuntimeStopped,
}

impl ApiError {
    /// Whether the caller can continue with the previous snapshot.
    ///
    /// Invariant violations are internal-contract bugs; everything else is advisory.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ApiError::InvariantViolation(_))
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ApiError {
    fn from(err: serde_yaml::Error) -> Self {
        ApiError::ParseError(err.to_string())
    }
}
