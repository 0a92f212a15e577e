//! Project state snapshots

use crate::helm::HelmMaps;
use crate::preview::{PreviewSession, PreviewState};
use crate::selection::{Selection, SelectionTargets};
use crate::store::ResourceMap;
use crate::tree::FileTree;
use crate::types::{Origin, PREVIEW_PREFIX};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;

/// Alerts kept for the UI before the oldest are dropped
pub const MAX_ALERTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
}

/// User-visible advisory produced by a recoverable failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Everything the pipeline owns for one open project
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    pub tree: FileTree,
    pub resources: ResourceMap,
    pub helm: HelmMaps,
    pub selection: Selection,
    pub preview: PreviewSession,
    #[serde(skip)]
    pub alerts: VecDeque<Alert>,
}

impl ProjectState {
    pub fn new(root: PathBuf) -> Self {
        Self {
            tree: FileTree::new(root),
            resources: ResourceMap::new(),
            helm: HelmMaps::default(),
            selection: Selection::None,
            preview: PreviewSession::default(),
            alerts: VecDeque::new(),
        }
    }

    pub fn push_alert(&mut self, alert: Alert) {
        if self.alerts.len() == MAX_ALERTS {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    /// Re-derive every selection and highlight flag from the active selection
    pub fn refresh_selection(&mut self) {
        let mut targets = SelectionTargets {
            tree: &mut self.tree,
            resources: &mut self.resources,
            helm: &mut self.helm,
        };
        self.selection = targets.apply(&self.selection);
    }

    pub fn preview_state(&self) -> &PreviewState {
        &self.preview.state
    }

    /// Check the cross-component invariants a committed snapshot must hold
    pub fn check_invariants(&self) -> Result<(), String> {
        self.tree.check_consistency()?;
        self.resources.check_ranges()?;

        let mut preview_origins = BTreeSet::new();
        for resource in self.resources.iter() {
            match resource.origin {
                Origin::Local => match self.tree.get(&resource.file_rel_path) {
                    Some(entry) if entry.is_file() => {}
                    _ => {
                        return Err(format!(
                            "resource {} refers to missing file {}",
                            resource.id, resource.file_rel_path
                        ))
                    }
                },
                origin => {
                    if !resource.file_rel_path.starts_with(PREVIEW_PREFIX) {
                        return Err(format!(
                            "preview resource {} has non-preview path {}",
                            resource.id, resource.file_rel_path
                        ));
                    }
                    preview_origins.insert(origin.as_str());
                }
            }
        }
        if preview_origins.len() > 1 {
            return Err(format!(
                "resources of several preview origins coexist: {:?}",
                preview_origins
            ));
        }
        if matches!(self.preview.state, PreviewState::Idle) && !preview_origins.is_empty() {
            return Err("preview resources present while no preview is active".to_string());
        }
        Ok(())
    }
}
