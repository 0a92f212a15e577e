//! Filesystem entry records

use crate::error::ExtractionError;
use crate::tree::path::file_name;
use crate::types::EntryKind;
use serde::Serialize;
use std::time::SystemTime;

/// One file or folder of the mirrored project tree
#[derive(Debug, Clone, Serialize)]
pub struct FileSystemEntry {
    /// Tree key, relative to the project root
    pub rel_path: String,
    pub name: String,
    pub kind: EntryKind,
    /// Last-known modification time
    pub timestamp: Option<SystemTime>,
    /// The editor holds unsaved changes for this file
    pub is_dirty: bool,
    pub is_selected: bool,
    pub is_highlighted: bool,
    /// blake3 of the last content read from or written to storage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// In-memory text of a resource file, including unsaved edits
    #[serde(skip)]
    pub text: Option<String>,
    /// Structural errors from the most recent extraction
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extraction_errors: Vec<ExtractionError>,
}

impl FileSystemEntry {
    pub fn new(rel_path: &str, kind: EntryKind, timestamp: Option<SystemTime>) -> Self {
        Self {
            rel_path: rel_path.to_string(),
            name: file_name(rel_path).to_string(),
            kind,
            timestamp,
            is_dirty: false,
            is_selected: false,
            is_highlighted: false,
            content_hash: None,
            text: None,
            extraction_errors: Vec::new(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// Hash used for content dedup
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}
