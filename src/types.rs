//! Core types: resource identity, source ranges, and origin tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved prefix for the synthetic file paths of preview-origin resources.
pub const PREVIEW_PREFIX: &str = "preview://";

/// Relative path key of the project root entry.
pub const ROOT_PATH: &str = "";

/// ResourceId: hex-encoded, truncated blake3 hash of a resource's identity tuple
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Derive the id of a document from its identity tuple.
    ///
    /// Fields are length-prefixed before hashing so that no two distinct tuples share a
    /// byte stream.
    pub fn derive(
        origin: Origin,
        kind: &str,
        api_version: &str,
        namespace: Option<&str>,
        name: &str,
        file_rel_path: &str,
        doc_index: usize,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        let fields = [
            origin.as_str(),
            kind,
            api_version,
            namespace.unwrap_or(""),
            name,
            file_rel_path,
        ];
        for field in fields {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(&(doc_index as u64).to_le_bytes());
        let hash = hasher.finalize();
        ResourceId(hex::encode(&hash.as_bytes()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight hex characters, for tables and log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        ResourceId(value.to_string())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Byte and line span of one document within its file's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Range {
    /// Byte offset of the first character of the document
    pub start: usize,
    /// Length in bytes
    pub length: usize,
    /// Zero-based line of `start`
    pub start_line: usize,
    /// Number of lines the document spans
    pub line_count: usize,
}

impl Range {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn overlaps(&self, other: &Range) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}

/// Where a resource came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    Local,
    PreviewKustomize,
    PreviewHelm,
    PreviewCluster,
}

impl Origin {
    pub fn is_preview(self) -> bool {
        !matches!(self, Origin::Local)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::PreviewKustomize => "preview-kustomize",
            Origin::PreviewHelm => "preview-helm",
            Origin::PreviewCluster => "preview-cluster",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filesystem entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}
