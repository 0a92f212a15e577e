//! Filesystem watcher adapter: notify events in, pipeline events out.

mod events;
mod runtime;

pub use events::{ChangeEvent, EventBatcher, WatchConfig};
pub use runtime::FsWatcher;
