//! Directory scanning with ignore globs

use crate::error::ApiError;
use crate::storage::FileStorage;
use crate::tree::{path, FileTree};
use crate::types::EntryKind;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// What the initial scan and the watcher pick up
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Globs matched against tree keys; matching paths never enter the tree
    pub ignore_patterns: Vec<String>,
    /// Extensions of files parsed for resources
    pub resource_extensions: Vec<String>,
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let patterns = [
            "**/.git",
            "**/.git/**",
            "**/node_modules",
            "**/node_modules/**",
            "**/.DS_Store",
        ];
        Self {
            ignore_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            resource_extensions: vec!["yaml".to_string(), "yml".to_string()],
            follow_symlinks: false,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.resource_extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            return Err(ApiError::ConfigError(
                "scan.resource_extensions cannot be empty".to_string(),
            ));
        }
        ScanFilter::from_config(self).map(|_| ())
    }
}

/// Decides which paths enter the tree and which files are parsed for resources
#[derive(Debug, Clone)]
pub struct ScanFilter {
    ignore: GlobSet,
    extensions: Vec<String>,
}

impl ScanFilter {
    pub fn new(ignore_patterns: &[String], extensions: &[String]) -> Result<Self, ApiError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                ApiError::ConfigError(format!("Invalid ignore pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let ignore = builder
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to build ignore set: {}", e)))?;
        let extensions = extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Ok(Self { ignore, extensions })
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self, ApiError> {
        Self::new(&config.ignore_patterns, &config.resource_extensions)
    }

    /// True for tree keys matching an ignore glob. The root is never ignored.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        !rel_path.is_empty() && self.ignore.is_match(rel_path)
    }

    /// True for files whose content is parsed into resources
    pub fn is_resource_file(&self, rel_path: &str) -> bool {
        let name = path::file_name(rel_path);
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            }
            _ => false,
        }
    }
}

/// Mirror everything below `rel_folder` into the tree.
///
/// Returns the keys of the files that were added, in walk order.
pub fn scan_folder(
    storage: &dyn FileStorage,
    tree: &mut FileTree,
    rel_folder: &str,
    filter: &ScanFilter,
) -> Result<Vec<String>, ApiError> {
    let root = tree.root_path().to_path_buf();
    let folder = tree.absolute_path(rel_folder);
    let accept = |candidate: &Path| -> bool {
        match path::relative_to_root(&root, candidate) {
            Some(rel) => !filter.is_ignored(&rel),
            None => false,
        }
    };

    let mut files = Vec::new();
    for (absolute, stat) in storage.walk(&folder, &accept)? {
        let rel = match tree.relative_path(&absolute) {
            Some(rel) => rel,
            None => continue,
        };
        tree.upsert_path(&rel, stat.kind, stat.modified);
        if stat.kind == EntryKind::File {
            files.push(rel);
        }
    }
    debug!(folder = %rel_folder, files = files.len(), "Scanned folder");
    Ok(files)
}
