//! Resource map
//!
//! Flat store of every known resource, keyed by id, with the cross-reference links that
//! drive related-resource highlighting.

pub mod refs;
pub mod resource;

pub use refs::{default_rules, RefMatcher, ReferenceConfig, ReferenceRule};
pub use resource::{RefDirection, RefKind, RefTarget, Resource, ResourceRef};

use crate::error::ApiError;
use crate::extract::split_documents;
use crate::tree::path;
use crate::types::{Origin, ResourceId};
use refs::RefIndex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// All resources of a project, local and preview
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ResourceMap {
    resources: BTreeMap<ResourceId, Resource>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, resource: Resource) {
        self.resources.insert(resource.id.clone(), resource);
    }

    pub fn remove(&mut self, id: &ResourceId) -> Option<Resource> {
        self.resources.remove(id)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn get_mut(&mut self, id: &ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }

    pub fn ids(&self) -> BTreeSet<ResourceId> {
        self.resources.keys().cloned().collect()
    }

    /// Resources extracted from exactly `rel_path`, in document order
    pub fn resources_for_path(&self, rel_path: &str) -> Vec<&Resource> {
        let mut found: Vec<&Resource> = self
            .resources
            .values()
            .filter(|r| r.file_rel_path == rel_path)
            .collect();
        found.sort_by_key(|r| r.doc_index);
        found
    }

    pub fn ids_for_path(&self, rel_path: &str) -> Vec<ResourceId> {
        self.resources_for_path(rel_path)
            .into_iter()
            .map(|r| r.id.clone())
            .collect()
    }

    /// Ids of resources whose file lies anywhere below `folder`
    pub fn ids_under(&self, folder: &str) -> BTreeSet<ResourceId> {
        self.resources
            .values()
            .filter(|r| r.origin == Origin::Local && path::is_under(&r.file_rel_path, folder))
            .map(|r| r.id.clone())
            .collect()
    }

    /// Drop every local resource extracted from one of `paths`
    pub fn remove_for_paths(&mut self, paths: &BTreeSet<String>) -> BTreeSet<ResourceId> {
        let doomed: BTreeSet<ResourceId> = self
            .resources
            .values()
            .filter(|r| r.origin == Origin::Local && paths.contains(&r.file_rel_path))
            .map(|r| r.id.clone())
            .collect();
        for id in &doomed {
            self.resources.remove(id);
        }
        doomed
    }

    /// Drop every preview-origin resource
    pub fn remove_previews(&mut self) -> BTreeSet<ResourceId> {
        let doomed: BTreeSet<ResourceId> = self
            .resources
            .values()
            .filter(|r| r.origin.is_preview())
            .map(|r| r.id.clone())
            .collect();
        for id in &doomed {
            self.resources.remove(id);
        }
        doomed
    }

    /// Re-derive the range and text of every resource in the file of `id` from the
    /// file's full text.
    ///
    /// Fails when the text no longer has a document at some resource's index, or when the
    /// edited resource's own text is no longer one whole document.
    pub fn recalculate_ranges(&mut self, id: &ResourceId, file_text: &str) -> Result<(), ApiError> {
        let (file_rel_path, origin, own_text) = {
            let resource = self
                .resources
                .get(id)
                .ok_or_else(|| ApiError::ResourceNotFound(id.clone()))?;
            (
                resource.file_rel_path.clone(),
                resource.origin,
                resource.text.clone(),
            )
        };

        let spans = split_documents(file_text);
        for sibling in self
            .resources
            .values_mut()
            .filter(|r| r.file_rel_path == file_rel_path && r.origin == origin)
        {
            let span = spans.get(sibling.doc_index).ok_or_else(|| {
                ApiError::ParseError(format!(
                    "{} no longer has a document at index {}",
                    file_rel_path, sibling.doc_index
                ))
            })?;
            sibling.range = span.range();
            sibling.text = file_text[span.start..span.end].to_string();
        }

        let updated = self
            .resources
            .get(id)
            .map(|r| r.text.as_str())
            .unwrap_or_default();
        if updated != own_text {
            return Err(ApiError::ParseError(format!(
                "edit to {} adds or removes a document separator",
                file_rel_path
            )));
        }
        Ok(())
    }

    /// Recompute cross-reference links after `changed` resources were added, edited or
    /// removed.
    ///
    /// Outgoing links are recomputed for the changed resources, for every resource
    /// linked to them, and for every resource a rule could link to a changed kind.
    /// Incoming links are then rebuilt from the outgoing ones, so running this twice
    /// yields the same link state. Local and preview resources are indexed separately
    /// and never linked to each other.
    pub fn reprocess(&mut self, changed: &BTreeSet<ResourceId>, rules: &[ReferenceRule]) {
        if changed.is_empty() {
            return;
        }

        let mut affected: BTreeSet<ResourceId> = changed
            .iter()
            .filter(|id| self.resources.contains_key(*id))
            .cloned()
            .collect();
        for resource in self.resources.values() {
            if resource.linked_ids().any(|id| changed.contains(id)) {
                affected.insert(resource.id.clone());
            }
        }
        let changed_kinds: BTreeSet<&str> = changed
            .iter()
            .filter_map(|id| self.resources.get(id))
            .map(|r| r.kind.as_str())
            .collect();
        affected.extend(refs::potential_sources(
            rules,
            &changed_kinds,
            self.resources.values(),
        ));

        let updates: Vec<(ResourceId, Vec<ResourceRef>)> = {
            let local = RefIndex::build(self.resources.values().filter(|r| !r.origin.is_preview()));
            let preview = RefIndex::build(self.resources.values().filter(|r| r.origin.is_preview()));
            affected
                .iter()
                .filter_map(|id| self.resources.get(id))
                .map(|resource| {
                    let index = if resource.origin.is_preview() {
                        &preview
                    } else {
                        &local
                    };
                    (
                        resource.id.clone(),
                        refs::compute_outgoing(resource, rules, index),
                    )
                })
                .collect()
        };

        for (id, outgoing) in updates {
            if let Some(resource) = self.resources.get_mut(&id) {
                resource.refs = outgoing;
            }
        }
        self.rebuild_incoming();
        debug!(
            changed = changed.len(),
            affected = affected.len(),
            "Reprocessed resource references"
        );
    }

    /// Recompute every link in the map
    pub fn reprocess_all(&mut self, rules: &[ReferenceRule]) {
        let all = self.ids();
        self.reprocess(&all, rules);
    }

    fn rebuild_incoming(&mut self) {
        let mut incoming: BTreeMap<ResourceId, BTreeSet<ResourceRef>> = BTreeMap::new();
        for resource in self.resources.values() {
            for link in resource.outgoing_refs() {
                if let Some(target) = link.resolved_target() {
                    if self.resources.contains_key(target) {
                        incoming.entry(target.clone()).or_default().insert(ResourceRef {
                            rule: link.rule.clone(),
                            kind: link.kind,
                            direction: RefDirection::Incoming,
                            target: RefTarget::Resource(resource.id.clone()),
                        });
                    }
                }
            }
        }

        for resource in self.resources.values_mut() {
            resource.refs.retain(|r| r.direction == RefDirection::Outgoing);
            if let Some(links) = incoming.remove(&resource.id) {
                resource.refs.extend(links);
            }
        }
    }

    pub fn clear_flags(&mut self) {
        for resource in self.resources.values_mut() {
            resource.is_selected = false;
            resource.is_highlighted = false;
        }
    }

    /// Verify that resources of each file are ordered by document and do not overlap
    pub fn check_ranges(&self) -> Result<(), String> {
        let mut by_file: BTreeMap<(&str, Origin), Vec<&Resource>> = BTreeMap::new();
        for resource in self.resources.values() {
            by_file
                .entry((resource.file_rel_path.as_str(), resource.origin))
                .or_default()
                .push(resource);
        }
        for ((file, _), mut resources) in by_file {
            resources.sort_by_key(|r| r.doc_index);
            for pair in resources.windows(2) {
                if pair[0].doc_index == pair[1].doc_index {
                    return Err(format!(
                        "{} has two resources at document {}",
                        file, pair[0].doc_index
                    ));
                }
                if pair[0].range.end() > pair[1].range.start {
                    return Err(format!(
                        "{}: range of document {} overlaps document {}",
                        file, pair[0].doc_index, pair[1].doc_index
                    ));
                }
            }
        }
        Ok(())
    }
}
