//! Relative path normalization for tree keys.
//!
//! Keys are POSIX-style, relative to the project root, with no leading or trailing
//! slash. The root itself is the empty string.

use std::path::{Component, Path};
use unicode_normalization::UnicodeNormalization;

/// Normalize a relative path into a tree key.
///
/// Returns `None` when the path climbs above the root.
pub fn normalize_rel_path(path: &str) -> Option<String> {
    let unified: String = path.replace('\\', "/").nfc().collect();
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Convert a path reported by the watcher or the storage layer into a tree key.
///
/// Relative inputs are taken as already relative to `root`.
pub fn relative_to_root(root: &Path, path: &Path) -> Option<String> {
    let rel = if path.is_absolute() {
        path.strip_prefix(root).ok()?
    } else {
        path
    };
    let mut joined = String::new();
    for component in rel.components() {
        match component {
            Component::Normal(name) => {
                if !joined.is_empty() {
                    joined.push('/');
                }
                joined.push_str(&name.to_string_lossy());
            }
            Component::ParentDir => {
                if !joined.is_empty() {
                    joined.push('/');
                }
                joined.push_str("..");
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    normalize_rel_path(&joined)
}

/// Parent key of `path`; `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or(""))
}

pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// True when `path` lies strictly below `prefix`.
pub fn is_under(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return !path.is_empty();
    }
    path.len() > prefix.len() && path.starts_with(prefix) && path.as_bytes()[prefix.len()] == b'/'
}

/// Join a folder key and a relative reference, resolving `.` and `..`.
pub fn join(folder: &str, reference: &str) -> Option<String> {
    if folder.is_empty() {
        normalize_rel_path(reference)
    } else {
        normalize_rel_path(&format!("{}/{}", folder, reference))
    }
}
