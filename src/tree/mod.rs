//! FileSystemEntry tree
//!
//! Flat, path-keyed mirror of the project directory. Keys are ordered, so every folder's
//! descendants form one contiguous key range.

pub mod node;
pub mod path;
pub mod walker;

pub use node::{content_hash, FileSystemEntry};
pub use walker::{ScanConfig, ScanFilter};

use crate::types::{EntryKind, ROOT_PATH};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Result of `FileTree::upsert_path`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upsert {
    /// Entries inserted by this call, ancestors first
    pub created: Vec<String>,
    /// Entries removed because an existing entry had a conflicting kind
    pub evicted: BTreeSet<String>,
    /// The target already existed with the same kind; only its timestamp changed
    pub refreshed: bool,
}

/// Project directory mirror
#[derive(Debug, Clone, Serialize)]
pub struct FileTree {
    root: PathBuf,
    entries: BTreeMap<String, FileSystemEntry>,
}

impl FileTree {
    /// Create a tree holding only the root entry
    pub fn new(root: PathBuf) -> Self {
        let mut entries = BTreeMap::new();
        let mut root_entry = FileSystemEntry::new(ROOT_PATH, EntryKind::Folder, None);
        root_entry.name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        entries.insert(ROOT_PATH.to_string(), root_entry);
        Self { root, entries }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn absolute_path(&self, rel_path: &str) -> PathBuf {
        if rel_path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel_path)
        }
    }

    /// Tree key for an absolute or root-relative path; `None` if outside the root
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        path::relative_to_root(&self.root, path)
    }

    pub fn get(&self, rel_path: &str) -> Option<&FileSystemEntry> {
        self.entries.get(rel_path)
    }

    pub fn get_mut(&mut self, rel_path: &str) -> Option<&mut FileSystemEntry> {
        self.entries.get_mut(rel_path)
    }

    pub fn contains(&self, rel_path: &str) -> bool {
        self.entries.contains_key(rel_path)
    }

    /// Number of entries, root included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileSystemEntry> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FileSystemEntry> {
        self.entries.values_mut()
    }

    /// Insert or refresh an entry, creating missing ancestor folders.
    ///
    /// Paths outside the root are logged and ignored. An existing entry of a different
    /// kind (including a file standing where an ancestor folder is needed) is replaced,
    /// and everything it held is reported in `evicted`.
    pub fn upsert_path(
        &mut self,
        rel_path: &str,
        kind: EntryKind,
        timestamp: Option<SystemTime>,
    ) -> Upsert {
        let mut outcome = Upsert::default();
        let rel_path = match path::normalize_rel_path(rel_path) {
            Some(p) => p,
            None => {
                warn!(path = %rel_path, "Ignoring path outside project root");
                return outcome;
            }
        };

        if rel_path.is_empty() {
            if kind == EntryKind::Folder {
                if let Some(root) = self.entries.get_mut(ROOT_PATH) {
                    root.timestamp = timestamp.or(root.timestamp);
                }
                outcome.refreshed = true;
            } else {
                warn!("Ignoring attempt to replace the root folder with a file");
            }
            return outcome;
        }

        let mut ancestors = Vec::new();
        let mut current = path::parent_path(&rel_path);
        while let Some(parent) = current {
            if parent.is_empty() {
                break;
            }
            ancestors.push(parent.to_string());
            current = path::parent_path(parent);
        }
        for ancestor in ancestors.into_iter().rev() {
            match self.entries.get(&ancestor).map(|e| e.kind) {
                Some(EntryKind::Folder) => {}
                Some(EntryKind::File) => {
                    debug!(path = %ancestor, "Replacing file with implied folder");
                    outcome.evicted.extend(self.remove_path(&ancestor));
                    self.insert_entry(&ancestor, EntryKind::Folder, None);
                    outcome.created.push(ancestor);
                }
                None => {
                    self.insert_entry(&ancestor, EntryKind::Folder, None);
                    outcome.created.push(ancestor);
                }
            }
        }

        match self.entries.get(&rel_path).map(|e| e.kind) {
            Some(existing_kind) if existing_kind == kind => {
                if let Some(existing) = self.entries.get_mut(&rel_path) {
                    existing.timestamp = timestamp.or(existing.timestamp);
                }
                outcome.refreshed = true;
            }
            Some(_) => {
                debug!(path = %rel_path, kind = ?kind, "Entry kind changed, replacing");
                outcome.evicted.extend(self.remove_path(&rel_path));
                self.insert_entry(&rel_path, kind, timestamp);
                outcome.created.push(rel_path);
            }
            None => {
                self.insert_entry(&rel_path, kind, timestamp);
                outcome.created.push(rel_path);
            }
        }
        outcome
    }

    fn insert_entry(&mut self, rel_path: &str, kind: EntryKind, timestamp: Option<SystemTime>) {
        self.entries.insert(
            rel_path.to_string(),
            FileSystemEntry::new(rel_path, kind, timestamp),
        );
    }

    /// Remove an entry and all of its descendants, returning every removed key
    pub fn remove_path(&mut self, rel_path: &str) -> BTreeSet<String> {
        let rel_path = match path::normalize_rel_path(rel_path) {
            Some(p) => p,
            None => return BTreeSet::new(),
        };
        if rel_path.is_empty() {
            warn!("Refusing to remove the root folder");
            return BTreeSet::new();
        }
        if !self.entries.contains_key(&rel_path) {
            return BTreeSet::new();
        }

        let mut removed = self.entries_under_prefix(&rel_path);
        removed.insert(rel_path);
        for key in &removed {
            self.entries.remove(key);
        }
        removed
    }

    /// Entries from the root down to the parent of `rel_path`; empty if unknown
    pub fn resolve_ancestors(&self, rel_path: &str) -> Vec<&FileSystemEntry> {
        if !self.entries.contains_key(rel_path) {
            return Vec::new();
        }
        let mut chain = Vec::new();
        let mut current = path::parent_path(rel_path);
        while let Some(parent) = current {
            if let Some(entry) = self.entries.get(parent) {
                chain.push(entry);
            }
            current = path::parent_path(parent);
        }
        chain.reverse();
        chain
    }

    /// Keys of every entry strictly below `rel_path`
    pub fn entries_under_prefix(&self, rel_path: &str) -> BTreeSet<String> {
        if rel_path.is_empty() {
            return self
                .entries
                .keys()
                .filter(|k| !k.is_empty())
                .cloned()
                .collect();
        }
        let prefix = format!("{}/", rel_path);
        self.entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Direct children of a folder, sorted by name
    pub fn children(&self, rel_path: &str) -> Vec<&FileSystemEntry> {
        self.entries_under_prefix(rel_path)
            .into_iter()
            .filter(|key| path::parent_path(key) == Some(rel_path))
            .filter_map(|key| self.entries.get(&key))
            .collect()
    }

    pub fn clear_flags(&mut self) {
        for entry in self.entries.values_mut() {
            entry.is_selected = false;
            entry.is_highlighted = false;
        }
    }

    /// Verify that the root exists and every entry's parent is a folder in the tree
    pub fn check_consistency(&self) -> Result<(), String> {
        match self.entries.get(ROOT_PATH) {
            Some(root) if root.is_folder() => {}
            _ => return Err("root entry missing".to_string()),
        }
        for key in self.entries.keys() {
            if let Some(parent) = path::parent_path(key) {
                match self.entries.get(parent) {
                    Some(entry) if entry.is_folder() => {}
                    Some(_) => return Err(format!("parent of {} is not a folder", key)),
                    None => return Err(format!("orphaned entry {}", key)),
                }
            }
        }
        Ok(())
    }
}
