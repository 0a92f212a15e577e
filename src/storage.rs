//! Storage I/O port used by the pipeline for reading and writing manifest files.

pub mod contract;
pub mod fs;
pub mod memory;

pub use contract::{FileStat, FileStorage};
pub use fs::FsStorage;
pub use memory::MemoryStorage;
