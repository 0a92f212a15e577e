//! Watch events, batching, and configuration.

use crate::error::ApiError;
use crate::pipeline::WorkspaceEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// A path is held back until it has been quiet this long
    pub debounce_ms: u64,
    /// How often pending events are checked
    pub batch_window_ms: u64,
    /// Pending paths that force an immediate flush
    pub max_batch_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            batch_window_ms: 50,
            max_batch_size: 100,
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.batch_window_ms == 0 || self.max_batch_size == 0 {
            return Err(ApiError::ConfigError(
                "watch.batch_window_ms and watch.max_batch_size must be greater than zero"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Filesystem change event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl ChangeEvent {
    /// Path the event is keyed on while batching
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) | ChangeEvent::Modified(p) | ChangeEvent::Removed(p) => p,
            ChangeEvent::Renamed { to, .. } => to,
        }
    }

    /// A rename is a removal followed by an addition
    pub fn into_workspace_events(self) -> Vec<WorkspaceEvent> {
        match self {
            ChangeEvent::Created(p) => vec![WorkspaceEvent::PathAdded(p)],
            ChangeEvent::Modified(p) => vec![WorkspaceEvent::FileChanged(p)],
            ChangeEvent::Removed(p) => vec![WorkspaceEvent::PathRemoved(p)],
            ChangeEvent::Renamed { from, to } => vec![
                WorkspaceEvent::PathRemoved(from),
                WorkspaceEvent::PathAdded(to),
            ],
        }
    }

    /// Fold a newer event for the same path into this one
    fn absorb(&mut self, newer: ChangeEvent) {
        let keep_created = matches!(self, ChangeEvent::Created(_))
            && matches!(newer, ChangeEvent::Modified(_));
        if !keep_created {
            *self = newer;
        }
    }
}

struct Pending {
    event: ChangeEvent,
    last_seen: Instant,
}

/// Coalesces bursts of events per path.
///
/// Each path keeps one pending event; it is released once the path has been quiet for
/// the debounce window. Released events keep the order in which their paths first
/// arrived.
pub struct EventBatcher {
    debounce: Duration,
    max_batch_size: usize,
    order: Vec<PathBuf>,
    pending: HashMap<PathBuf, Pending>,
}

impl EventBatcher {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            max_batch_size: config.max_batch_size,
            order: Vec::new(),
            pending: HashMap::new(),
        }
    }

    /// Queue an event; returns true when the batch is full and should be flushed
    pub fn add_event(&mut self, event: ChangeEvent, now: Instant) -> bool {
        let path = event.path().to_path_buf();
        match self.pending.get_mut(&path) {
            Some(pending) => {
                pending.event.absorb(event);
                pending.last_seen = now;
            }
            None => {
                self.order.push(path.clone());
                self.pending.insert(
                    path,
                    Pending {
                        event,
                        last_seen: now,
                    },
                );
            }
        }
        self.pending.len() >= self.max_batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Events whose path has been quiet for the debounce window
    pub fn take_ready(&mut self, now: Instant) -> Vec<ChangeEvent> {
        let debounce = self.debounce;
        let ready: Vec<PathBuf> = self
            .order
            .iter()
            .filter(|path| {
                self.pending
                    .get(*path)
                    .map(|p| now.duration_since(p.last_seen) >= debounce)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        self.release(&ready)
    }

    /// Every pending event
    pub fn take_batch(&mut self) -> Vec<ChangeEvent> {
        let all = self.order.clone();
        self.release(&all)
    }

    fn release(&mut self, paths: &[PathBuf]) -> Vec<ChangeEvent> {
        let events: Vec<ChangeEvent> = paths
            .iter()
            .filter_map(|path| self.pending.remove(path))
            .map(|p| p.event)
            .collect();
        self.order.retain(|path| self.pending.contains_key(path));
        events
    }
}
