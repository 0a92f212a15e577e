//! Watcher loop: receives notify events, batches them, and forwards pipeline events.

use super::events::{ChangeEvent, EventBatcher, WatchConfig};
use crate::error::{ApiError, StorageError};
use crate::pipeline::WorkspaceEvent;
use crate::tree::{path, ScanFilter};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Watches a project root and turns filesystem notifications into `WorkspaceEvent`s
pub struct FsWatcher {
    root: PathBuf,
    filter: ScanFilter,
    config: WatchConfig,
    running: Arc<RwLock<bool>>,
}

fn watch_error(message: String) -> ApiError {
    ApiError::StorageError(StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        message,
    )))
}

impl FsWatcher {
    pub fn new(root: PathBuf, filter: ScanFilter, config: WatchConfig) -> Self {
        Self {
            root,
            filter,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Ask a running `run` loop to return after its current wait
    pub fn stop(&self) {
        *self.running.write() = false;
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Block, forwarding events to `sink` until stopped or until `sink` fails.
    pub fn run<F>(&self, sink: F) -> Result<(), ApiError>
    where
        F: Fn(WorkspaceEvent) -> Result<(), ApiError>,
    {
        *self.running.write() = true;

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.send(res) {
                error!("Error sending watch event: {}", e);
            }
        })
        .map_err(|e| watch_error(format!("Failed to create watcher: {}", e)))?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| watch_error(format!("Failed to watch directory: {}", e)))?;
        info!(root = %self.root.display(), "Watching project");

        let mut batcher = EventBatcher::new(&self.config);
        let window = Duration::from_millis(self.config.batch_window_ms);

        let outcome = loop {
            if !self.is_running() {
                break Ok(());
            }

            let mut flush_all = false;
            match rx.recv_timeout(window) {
                Ok(Ok(event)) => {
                    for change in self.convert_event(event) {
                        flush_all |= batcher.add_event(change, Instant::now());
                    }
                }
                Ok(Err(e)) => warn!("Watch error: {}", e),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watcher channel disconnected");
                    break Ok(());
                }
            }

            let ready = if flush_all {
                batcher.take_batch()
            } else {
                batcher.take_ready(Instant::now())
            };
            if let Err(e) = self.forward(ready, &sink) {
                break Err(e);
            }
        };

        *self.running.write() = false;
        outcome
    }

    fn forward<F>(&self, changes: Vec<ChangeEvent>, sink: &F) -> Result<(), ApiError>
    where
        F: Fn(WorkspaceEvent) -> Result<(), ApiError>,
    {
        if changes.is_empty() {
            return Ok(());
        }
        debug!(event_count = changes.len(), "Forwarding change events");
        for change in changes {
            for event in change.into_workspace_events() {
                sink(event)?;
            }
        }
        Ok(())
    }

    fn is_ignored(&self, candidate: &Path) -> bool {
        match path::relative_to_root(&self.root, candidate) {
            Some(rel) => self.filter.is_ignored(&rel),
            None => true,
        }
    }

    /// Map a notify event to change events, dropping ignored paths
    pub fn convert_event(&self, event: Event) -> Vec<ChangeEvent> {
        let first = event.paths.first().cloned();
        let change = match event.kind {
            EventKind::Create(_) => first.map(ChangeEvent::Created),
            EventKind::Modify(notify::event::ModifyKind::Name(_)) => {
                if event.paths.len() >= 2 {
                    Some(ChangeEvent::Renamed {
                        from: event.paths[0].clone(),
                        to: event.paths[1].clone(),
                    })
                } else {
                    // A lone rename half; the path either appeared or vanished.
                    first.map(|p| {
                        if p.exists() {
                            ChangeEvent::Created(p)
                        } else {
                            ChangeEvent::Removed(p)
                        }
                    })
                }
            }
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) => first.map(ChangeEvent::Modified),
            EventKind::Remove(_) => first.map(ChangeEvent::Removed),
            _ => None,
        };

        match change {
            Some(ChangeEvent::Renamed { from, to }) => {
                match (self.is_ignored(&from), self.is_ignored(&to)) {
                    (false, false) => vec![ChangeEvent::Renamed { from, to }],
                    (false, true) => vec![ChangeEvent::Removed(from)],
                    (true, false) => vec![ChangeEvent::Created(to)],
                    (true, true) => Vec::new(),
                }
            }
            Some(change) if !self.is_ignored(change.path()) => vec![change],
            _ => Vec::new(),
        }
    }
}
