//! Selection and highlight engine
//!
//! Selection flags are never edited piecemeal: every change clears all flags and derives
//! them again from the single active [`Selection`].

use crate::helm::HelmMaps;
use crate::store::ResourceMap;
use crate::tree::FileTree;
use crate::types::{Origin, ResourceId};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// The one active selection of a project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Selection {
    #[default]
    None,
    Resource { id: ResourceId },
    Path { path: String },
    HelmValues { id: String, path: String },
}

impl Selection {
    pub fn is_none(&self) -> bool {
        matches!(self, Selection::None)
    }

    pub fn selected_resource(&self) -> Option<&ResourceId> {
        match self {
            Selection::Resource { id } => Some(id),
            _ => None,
        }
    }

    pub fn selected_path(&self) -> Option<&str> {
        match self {
            Selection::Path { path } | Selection::HelmValues { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Mutable views of everything that carries selection flags
pub struct SelectionTargets<'a> {
    pub tree: &'a mut FileTree,
    pub resources: &'a mut ResourceMap,
    pub helm: &'a mut HelmMaps,
}

impl SelectionTargets<'_> {
    fn clear(&mut self) {
        self.tree.clear_flags();
        self.resources.clear_flags();
        self.helm.clear_selection();
    }

    /// Clear every flag, then derive flags for `selection`.
    ///
    /// Returns the selection that is actually in effect: `Selection::None` when its
    /// target no longer exists.
    pub fn apply(&mut self, selection: &Selection) -> Selection {
        self.clear();
        let effective = match selection {
            Selection::None => Selection::None,
            Selection::Resource { id } => self.select_resource(id),
            Selection::Path { path } => self.select_path(path),
            Selection::HelmValues { id, .. } => self.select_helm_values(id),
        };
        if effective != *selection {
            debug!(requested = ?selection, "Selection target is gone, selection cleared");
        }
        effective
    }

    fn select_resource(&mut self, id: &ResourceId) -> Selection {
        let (linked, file) = match self.resources.get_mut(id) {
            Some(resource) => {
                resource.is_selected = true;
                let linked: BTreeSet<ResourceId> = resource.linked_ids().cloned().collect();
                let file = (resource.origin == Origin::Local).then(|| resource.file_rel_path.clone());
                (linked, file)
            }
            None => return Selection::None,
        };

        for linked_id in &linked {
            if let Some(related) = self.resources.get_mut(linked_id) {
                related.is_highlighted = true;
            }
        }
        if let Some(entry) = file.and_then(|path| self.tree.get_mut(&path)) {
            entry.is_highlighted = true;
        }
        Selection::Resource { id: id.clone() }
    }

    fn select_path(&mut self, path: &str) -> Selection {
        let is_folder = match self.tree.get_mut(path) {
            Some(entry) => {
                entry.is_selected = true;
                entry.is_folder()
            }
            None => return Selection::None,
        };

        let ancestors: Vec<String> = self
            .tree
            .resolve_ancestors(path)
            .into_iter()
            .map(|entry| entry.rel_path.clone())
            .collect();
        for ancestor in ancestors {
            if let Some(entry) = self.tree.get_mut(&ancestor) {
                entry.is_highlighted = true;
            }
        }

        let related: Vec<ResourceId> = if is_folder {
            self.resources.ids_under(path).into_iter().collect()
        } else {
            self.resources.ids_for_path(path)
        };
        for id in related {
            if let Some(resource) = self.resources.get_mut(&id) {
                resource.is_highlighted = true;
            }
        }

        self.helm.select_path(path);
        Selection::Path {
            path: path.to_string(),
        }
    }

    fn select_helm_values(&mut self, id: &str) -> Selection {
        let path = match self.helm.values.get(id) {
            Some(values) => values.file_path.clone(),
            None => return Selection::None,
        };
        match self.select_path(&path) {
            Selection::Path { path } => Selection::HelmValues {
                id: id.to_string(),
                path,
            },
            _ => Selection::None,
        }
    }
}
