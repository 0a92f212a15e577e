use crate::error::StorageError;
use crate::types::EntryKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Metadata returned by `FileStorage::stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: EntryKind,
    pub modified: Option<SystemTime>,
}

/// Backing storage for project files. All paths are absolute.
pub trait FileStorage: Send + Sync {
    fn read_file(&self, path: &Path) -> Result<String, StorageError>;
    fn write_file(&self, path: &Path, content: &str) -> Result<(), StorageError>;
    fn stat(&self, path: &Path) -> Result<FileStat, StorageError>;

    /// List every descendant of `dir`. Paths rejected by `filter` are skipped along with
    /// their subtrees.
    fn walk(
        &self,
        dir: &Path,
        filter: &dyn Fn(&Path) -> bool,
    ) -> Result<Vec<(PathBuf, FileStat)>, StorageError>;
}
