use crate::error::StorageError;
use crate::storage::{FileStat, FileStorage};
use crate::types::EntryKind;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// `FileStorage` backed by the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FsStorage {
    follow_symlinks: bool,
}

impl FsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }
}

fn stat_from_metadata(metadata: &std::fs::Metadata) -> FileStat {
    FileStat {
        kind: if metadata.is_dir() {
            EntryKind::Folder
        } else {
            EntryKind::File
        },
        modified: metadata.modified().ok(),
    }
}

impl FileStorage for FsStorage {
    fn read_file(&self, path: &Path) -> Result<String, StorageError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            _ => StorageError::IoError(e),
        })?;
        String::from_utf8(bytes).map_err(|_| StorageError::NotUtf8(path.to_path_buf()))
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<(), StorageError> {
        std::fs::write(path, content)?;
        Ok(())
    }

    fn stat(&self, path: &Path) -> Result<FileStat, StorageError> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            _ => StorageError::IoError(e),
        })?;
        Ok(stat_from_metadata(&metadata))
    }

    fn walk(
        &self,
        dir: &Path,
        filter: &dyn Fn(&Path) -> bool,
    ) -> Result<Vec<(PathBuf, FileStat)>, StorageError> {
        let mut found = Vec::new();
        let walker = WalkDir::new(dir)
            .follow_links(self.follow_symlinks)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| filter(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            match entry.metadata() {
                Ok(metadata) => found.push((entry.into_path(), stat_from_metadata(&metadata))),
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to stat entry");
                }
            }
        }
        Ok(found)
    }
}
