use crate::error::StorageError;
use crate::storage::{FileStat, FileStorage};
use crate::types::EntryKind;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// In-memory `FileStorage` with a logical clock for modification times.
///
/// Writing a file creates its parent folders.
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<PathBuf, (String, SystemTime)>>,
    folders: RwLock<BTreeSet<PathBuf>>,
    clock: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> SystemTime {
        let t = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(t)
    }

    fn add_parents(&self, path: &Path) {
        let mut folders = self.folders.write();
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() || !folders.insert(dir.to_path_buf()) {
                break;
            }
            current = dir.parent();
        }
    }

    /// Create or overwrite a file, bypassing the write-failure switch.
    pub fn insert_file(&self, path: impl AsRef<Path>, content: &str) {
        let path = path.as_ref();
        self.add_parents(path);
        let modified = self.tick();
        self.files
            .write()
            .insert(path.to_path_buf(), (content.to_string(), modified));
    }

    pub fn create_folder(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.add_parents(path);
        self.folders.write().insert(path.to_path_buf());
    }

    /// Remove a file or folder and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.files.write().retain(|p, _| !p.starts_with(path));
        self.folders.write().retain(|p| !p.starts_with(path));
    }

    /// Make every subsequent `write_file` fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.read().get(path.as_ref()).map(|(c, _)| c.clone())
    }
}

impl FileStorage for MemoryStorage {
    fn read_file(&self, path: &Path) -> Result<String, StorageError> {
        self.files
            .read()
            .get(path)
            .map(|(content, _)| content.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::IoError(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("write to {} refused", path.display()),
            )));
        }
        self.insert_file(path, content);
        Ok(())
    }

    fn stat(&self, path: &Path) -> Result<FileStat, StorageError> {
        if let Some((_, modified)) = self.files.read().get(path) {
            return Ok(FileStat {
                kind: EntryKind::File,
                modified: Some(*modified),
            });
        }
        if self.folders.read().contains(path) {
            return Ok(FileStat {
                kind: EntryKind::Folder,
                modified: None,
            });
        }
        Err(StorageError::NotFound(path.to_path_buf()))
    }

    fn walk(
        &self,
        dir: &Path,
        filter: &dyn Fn(&Path) -> bool,
    ) -> Result<Vec<(PathBuf, FileStat)>, StorageError> {
        if !self.folders.read().contains(dir) {
            return Err(StorageError::NotFound(dir.to_path_buf()));
        }

        let mut found: Vec<(PathBuf, FileStat)> = Vec::new();
        for folder in self.folders.read().iter() {
            if folder != dir && folder.starts_with(dir) {
                found.push((
                    folder.clone(),
                    FileStat {
                        kind: EntryKind::Folder,
                        modified: None,
                    },
                ));
            }
        }
        for (file, (_, modified)) in self.files.read().iter() {
            if file.starts_with(dir) {
                found.push((
                    file.clone(),
                    FileStat {
                        kind: EntryKind::File,
                        modified: Some(*modified),
                    },
                ));
            }
        }

        // A rejected path hides its whole subtree, matching the filesystem walker.
        found.retain(|(path, _)| {
            path.strip_prefix(dir)
                .map(|rel| {
                    let mut current = dir.to_path_buf();
                    rel.components().all(|component| {
                        current.push(component);
                        filter(&current)
                    })
                })
                .unwrap_or(false)
        });
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }
}
