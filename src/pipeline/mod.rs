//! Mutation pipeline
//!
//! The pipeline is the only writer of project state. Every operation runs as a
//! transaction against a draft copy of the committed [`ProjectState`]; the draft is
//! checked for consistency and swapped in only when the whole operation succeeded.
//! A failed operation leaves the committed snapshot untouched and records an alert.

pub mod events;
pub mod state;

pub use events::WorkspaceEvent;
pub use state::{Alert, AlertSeverity, ProjectState, MAX_ALERTS};

use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::extract::{extract, ExtractionConfig};
use crate::preview::{self, PreviewConfig, PreviewRequest, PreviewState, PreviewTicket, PreviewType, RenderedDocument};
use crate::selection::Selection;
use crate::storage::FileStorage;
use crate::store::ReferenceRule;
use crate::tree::{content_hash, path, walker, ScanFilter};
use crate::types::{EntryKind, Origin, ResourceId};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Read-only collaborators and settings shared by every transaction
struct Engine {
    storage: Arc<dyn FileStorage>,
    filter: ScanFilter,
    extraction: ExtractionConfig,
    rules: Vec<ReferenceRule>,
    preview: PreviewConfig,
}

impl Engine {
    fn absolute(&self, state: &ProjectState, rel_path: &str) -> PathBuf {
        state.tree.absolute_path(rel_path)
    }

    /// Read a resource file and replace its resources; returns the ids that changed
    fn load_file(&self, state: &mut ProjectState, rel_path: &str) -> Result<BTreeSet<ResourceId>, ApiError> {
        let content = self.storage.read_file(&self.absolute(state, rel_path))?;
        Ok(self.ingest(state, rel_path, &content))
    }

    /// Replace the resources of `rel_path` with those extracted from `content`
    fn ingest(&self, state: &mut ProjectState, rel_path: &str, content: &str) -> BTreeSet<ResourceId> {
        let mut changed: BTreeSet<ResourceId> = state.resources.ids_for_path(rel_path).into_iter().collect();
        for id in &changed {
            state.resources.remove(id);
        }

        let extraction = extract(content, rel_path, Origin::Local, &self.extraction);
        if !extraction.errors.is_empty() {
            warn!(
                path = %rel_path,
                errors = extraction.errors.len(),
                "Some documents could not be parsed"
            );
            let detail = extraction
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            state.push_alert(Alert::new(
                AlertSeverity::Warning,
                format!("Could not parse {}", rel_path),
                detail,
            ));
        }

        if let Some(entry) = state.tree.get_mut(rel_path) {
            entry.text = Some(content.to_string());
            entry.content_hash = Some(content_hash(content));
            entry.extraction_errors = extraction.errors;
            entry.is_dirty = false;
        }
        for resource in extraction.resources {
            changed.insert(resource.id.clone());
            state.resources.put(resource);
        }
        changed
    }

    /// Mirror a folder into the tree and load every resource file below it
    fn scan(&self, state: &mut ProjectState, rel_folder: &str) -> Result<BTreeSet<ResourceId>, ApiError> {
        let files = walker::scan_folder(self.storage.as_ref(), &mut state.tree, rel_folder, &self.filter)?;
        let mut changed = BTreeSet::new();
        for file in files.iter().filter(|f| self.filter.is_resource_file(f)) {
            match self.load_file(state, file) {
                Ok(ids) => changed.extend(ids),
                Err(e) => {
                    warn!(path = %file, error = %e, "Skipping unreadable file");
                    state.push_alert(Alert::new(
                        AlertSeverity::Warning,
                        format!("Could not read {}", file),
                        e.to_string(),
                    ));
                }
            }
        }
        Ok(changed)
    }

    /// Drop the resources of removed or replaced paths
    fn evict_paths(&self, state: &mut ProjectState, paths: &BTreeSet<String>) -> BTreeSet<ResourceId> {
        if paths.is_empty() {
            return BTreeSet::new();
        }
        state.resources.remove_for_paths(paths)
    }

    fn on_file_changed(&self, state: &mut ProjectState, rel_path: &str) -> Result<(), ApiError> {
        let known_file = state.tree.get(rel_path).map(|e| e.is_file()).unwrap_or(false);
        if !known_file {
            return self.on_path_added(state, rel_path);
        }
        let absolute = self.absolute(state, rel_path);
        let stat = self.storage.stat(&absolute)?;
        if stat.kind != EntryKind::File {
            return self.on_path_added(state, rel_path);
        }
        if !self.filter.is_resource_file(rel_path) {
            state.tree.upsert_path(rel_path, EntryKind::File, stat.modified);
            return Ok(());
        }

        let content = self.storage.read_file(&absolute)?;
        let hash = content_hash(&content);
        let unchanged = state
            .tree
            .get(rel_path)
            .and_then(|e| e.content_hash.as_deref())
            == Some(hash.as_str());
        state.tree.upsert_path(rel_path, EntryKind::File, stat.modified);
        if unchanged {
            debug!(path = %rel_path, "Content unchanged, timestamp refreshed");
            return Ok(());
        }

        let changed = self.ingest(state, rel_path, &content);
        state.resources.reprocess(&changed, &self.rules);
        state.helm.rebuild(&state.tree);
        info!(path = %rel_path, changed = changed.len(), "File changed");
        Ok(())
    }

    fn on_path_added(&self, state: &mut ProjectState, rel_path: &str) -> Result<(), ApiError> {
        if self.filter.is_ignored(rel_path) {
            debug!(path = %rel_path, "Ignoring excluded path");
            return Ok(());
        }
        let stat = self.storage.stat(&self.absolute(state, rel_path))?;
        let existing = state.tree.get(rel_path).map(|e| e.kind);
        if existing == Some(EntryKind::File) && stat.kind == EntryKind::File {
            return self.on_file_changed(state, rel_path);
        }

        let upsert = state.tree.upsert_path(rel_path, stat.kind, stat.modified);
        let mut changed = self.evict_paths(state, &upsert.evicted);
        match stat.kind {
            EntryKind::Folder => changed.extend(self.scan(state, rel_path)?),
            EntryKind::File if self.filter.is_resource_file(rel_path) => {
                changed.extend(self.load_file(state, rel_path)?)
            }
            EntryKind::File => {}
        }
        state.resources.reprocess(&changed, &self.rules);
        state.helm.rebuild(&state.tree);
        info!(path = %rel_path, kind = ?stat.kind, created = upsert.created.len(), "Path added");
        Ok(())
    }

    fn on_path_removed(&self, state: &mut ProjectState, rel_path: &str) -> Result<(), ApiError> {
        let removed = state.tree.remove_path(rel_path);
        if removed.is_empty() {
            debug!(path = %rel_path, "Removed path was not in the tree");
            return Ok(());
        }
        let evicted = self.evict_paths(state, &removed);
        state.resources.reprocess(&evicted, &self.rules);
        state.helm.rebuild(&state.tree);
        info!(
            path = %rel_path,
            entries = removed.len(),
            resources = evicted.len(),
            "Path removed"
        );
        Ok(())
    }

    /// Write `content` and take it as the file's new known content
    fn save_file(&self, state: &mut ProjectState, rel_path: &str, content: &str) -> Result<(), ApiError> {
        match state.tree.get(rel_path) {
            Some(entry) if entry.is_file() => {}
            _ => return Err(ApiError::PathNotInTree(rel_path.to_string())),
        }
        let absolute = self.absolute(state, rel_path);
        self.storage.write_file(&absolute, content)?;
        let modified = self.storage.stat(&absolute).ok().and_then(|s| s.modified);
        state.tree.upsert_path(rel_path, EntryKind::File, modified);

        if self.filter.is_resource_file(rel_path) {
            let changed = self.ingest(state, rel_path, content);
            state.resources.reprocess(&changed, &self.rules);
        } else if let Some(entry) = state.tree.get_mut(rel_path) {
            entry.content_hash = Some(content_hash(content));
            entry.is_dirty = false;
        }
        state.helm.rebuild(&state.tree);
        info!(path = %rel_path, bytes = content.len(), "File saved");
        Ok(())
    }

    /// In-memory text of a file, falling back to storage
    fn file_text(&self, state: &ProjectState, rel_path: &str) -> Result<String, ApiError> {
        match state.tree.get(rel_path) {
            Some(entry) if entry.is_file() => match &entry.text {
                Some(text) => Ok(text.clone()),
                None => Ok(self.storage.read_file(&self.absolute(state, rel_path))?),
            },
            _ => Err(ApiError::PathNotInTree(rel_path.to_string())),
        }
    }

    fn local_file_of(&self, state: &ProjectState, id: &ResourceId) -> Result<String, ApiError> {
        let resource = state
            .resources
            .get(id)
            .ok_or_else(|| ApiError::ResourceNotFound(id.clone()))?;
        if resource.origin != Origin::Local {
            return Err(ApiError::PathNotInTree(resource.file_rel_path.clone()));
        }
        Ok(resource.file_rel_path.clone())
    }

    fn on_update_resource(&self, state: &mut ProjectState, id: &ResourceId, new_text: &str) -> Result<(), ApiError> {
        let rel_path = self.local_file_of(state, id)?;
        let file_text = self.file_text(state, &rel_path)?;
        let range = state
            .resources
            .get(id)
            .map(|r| r.range)
            .ok_or_else(|| ApiError::ResourceNotFound(id.clone()))?;
        if range.end() > file_text.len() {
            return Err(ApiError::InvariantViolation(format!(
                "range of {} lies outside {}",
                id, rel_path
            )));
        }

        let mut new_text = new_text.to_string();
        if range.end() < file_text.len() && !new_text.ends_with('\n') {
            new_text.push('\n');
        }
        let updated_file = format!(
            "{}{}{}",
            &file_text[..range.start],
            new_text,
            &file_text[range.end()..]
        );

        if let Some(resource) = state.resources.get_mut(id) {
            resource.reparse(&new_text, &self.extraction)?;
            resource.is_dirty = true;
        }
        state.resources.recalculate_ranges(id, &updated_file)?;
        if let Some(entry) = state.tree.get_mut(&rel_path) {
            entry.text = Some(updated_file);
            entry.is_dirty = true;
        }

        let changed: BTreeSet<ResourceId> = [id.clone()].into_iter().collect();
        state.resources.reprocess(&changed, &self.rules);
        debug!(resource_id = %id, path = %rel_path, "Resource updated");
        Ok(())
    }

    fn on_save_resource(&self, state: &mut ProjectState, id: &ResourceId) -> Result<(), ApiError> {
        let rel_path = self.local_file_of(state, id)?;
        let text = self.file_text(state, &rel_path)?;
        self.save_file(state, &rel_path, &text)
    }

    fn select(&self, state: &mut ProjectState, selection: Selection) -> Result<(), ApiError> {
        let missing = match &selection {
            Selection::None => None,
            Selection::Resource { id } => {
                (!state.resources.contains(id)).then(|| ApiError::ResourceNotFound(id.clone()))
            }
            Selection::Path { path } => {
                (!state.tree.contains(path)).then(|| ApiError::PathNotInTree(path.clone()))
            }
            Selection::HelmValues { id, .. } => (!state.helm.values.contains_key(id))
                .then(|| ApiError::HelmValuesNotFound(id.clone())),
        };
        if let Some(err) = missing {
            return Err(err);
        }
        state.selection = selection;
        Ok(())
    }

    /// Resolve and check a preview target; returns the input path for the renderer
    fn preview_input(
        &self,
        state: &ProjectState,
        preview_type: PreviewType,
        target: &str,
    ) -> Result<Option<PathBuf>, ApiError> {
        let invalid = || ApiError::InvalidPreviewTarget {
            preview_type: preview_type.to_string(),
            target: target.to_string(),
        };
        match preview_type {
            PreviewType::Kustomization => {
                let resource = state.resources.get(&ResourceId::from(target)).ok_or_else(invalid)?;
                if resource.origin != Origin::Local || resource.kind != "Kustomization" {
                    return Err(invalid());
                }
                Ok(Some(self.absolute(state, resource.folder())))
            }
            PreviewType::Helm => {
                let values = state.helm.values.get(target).ok_or_else(invalid)?;
                Ok(Some(self.absolute(state, &values.file_path)))
            }
            PreviewType::Cluster => {
                if target.trim().is_empty() {
                    return Err(invalid());
                }
                Ok(None)
            }
        }
    }

    fn on_start_preview(
        &self,
        state: &mut ProjectState,
        preview_type: PreviewType,
        target: &str,
    ) -> Result<Option<PreviewRequest>, ApiError> {
        let input = self.preview_input(state, preview_type, target)?;
        let start = state
            .preview
            .start(preview_type, target, self.preview.supersede_in_flight)?;
        if !start.needs_render() {
            debug!(target = %target, "Preview already loading");
            return Ok(None);
        }
        info!(preview_type = %preview_type, target = %target, ticket = %start.ticket(), "Preview started");
        Ok(Some(PreviewRequest {
            ticket: start.ticket(),
            preview_type,
            target: target.to_string(),
            input,
        }))
    }

    fn on_commit_preview(
        &self,
        state: &mut ProjectState,
        ticket: PreviewTicket,
        documents: &[RenderedDocument],
    ) -> Result<(), ApiError> {
        let (preview_type, target) = match state.preview.pending(ticket) {
            Some((preview_type, target)) => (preview_type, target.to_string()),
            None => return Ok(()),
        };
        let (admitted, failed) = preview::admit(
            &mut state.resources,
            documents,
            preview_type.origin(),
            &self.extraction,
        )?;
        if failed > 0 {
            state.push_alert(Alert::new(
                AlertSeverity::Warning,
                format!("{} preview", preview_type),
                format!("{} rendered documents could not be parsed", failed),
            ));
        }
        state.resources.reprocess(&admitted, &self.rules);
        state.preview.activate(preview_type, &target);
        info!(
            preview_type = %preview_type,
            target = %target,
            resources = admitted.len(),
            "Preview committed"
        );
        Ok(())
    }

    fn on_fail_preview(&self, state: &mut ProjectState, ticket: PreviewTicket, reason: &str) {
        let preview_type = match state.preview.pending(ticket) {
            Some((preview_type, _)) => preview_type,
            None => return,
        };
        self.on_clear_preview(state);
        warn!(preview_type = %preview_type, reason = %reason, "Preview failed");
        state.push_alert(Alert::new(
            AlertSeverity::Error,
            format!("{} preview failed", preview_type),
            reason,
        ));
    }

    fn on_clear_preview(&self, state: &mut ProjectState) {
        let evicted = state.resources.remove_previews();
        state.resources.reprocess(&evicted, &self.rules);
        state.preview.reset();
    }
}

/// Single owner of a project's state.
///
/// Callers read [`Pipeline::snapshot`]; every mutation goes through one of the
/// operations below.
pub struct Pipeline {
    engine: Engine,
    state: Arc<ProjectState>,
}

impl Pipeline {
    /// Open a project: scan the root, extract every resource file, link resources and
    /// detect Helm charts.
    pub fn open(root: &Path, storage: Arc<dyn FileStorage>, config: &SyncConfig) -> Result<Self, ApiError> {
        config.validate()?;
        let root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        match storage.stat(&root) {
            Ok(stat) if stat.kind == EntryKind::Folder => {}
            _ => return Err(ApiError::RootNotFound),
        }

        let engine = Engine {
            storage,
            filter: ScanFilter::from_config(&config.scan)?,
            extraction: config.extraction.clone(),
            rules: config.references.rules.clone(),
            preview: config.preview.clone(),
        };
        let state = Self::load(&engine, root)?;
        Ok(Self {
            engine,
            state: Arc::new(state),
        })
    }

    fn load(engine: &Engine, root: PathBuf) -> Result<ProjectState, ApiError> {
        let mut state = ProjectState::new(root);
        engine.scan(&mut state, "")?;
        state.resources.reprocess_all(&engine.rules);
        state.helm.rebuild(&state.tree);
        state
            .check_invariants()
            .map_err(ApiError::InvariantViolation)?;
        info!(
            root = %state.tree.root_path().display(),
            entries = state.tree.len(),
            resources = state.resources.len(),
            charts = state.helm.charts.len(),
            "Project opened"
        );
        Ok(state)
    }

    /// Committed state
    pub fn snapshot(&self) -> Arc<ProjectState> {
        Arc::clone(&self.state)
    }

    pub fn root(&self) -> &Path {
        self.state.tree.root_path()
    }

    pub fn preview_config(&self) -> &PreviewConfig {
        &self.engine.preview
    }

    /// Drain pending alerts
    pub fn take_alerts(&mut self) -> Vec<Alert> {
        if self.state.alerts.is_empty() {
            return Vec::new();
        }
        Arc::make_mut(&mut self.state).alerts.drain(..).collect()
    }

    /// Run `operation` against a draft and commit it if it succeeds and the draft is
    /// consistent.
    fn transact<T, F>(&mut self, name: &str, operation: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Engine, &mut ProjectState) -> Result<T, ApiError>,
    {
        let mut draft = (*self.state).clone();
        let outcome = operation(&self.engine, &mut draft).and_then(|value| {
            draft.refresh_selection();
            draft
                .check_invariants()
                .map_err(ApiError::InvariantViolation)?;
            Ok(value)
        });

        match outcome {
            Ok(value) => {
                self.state = Arc::new(draft);
                Ok(value)
            }
            Err(e) => {
                if e.is_recoverable() {
                    warn!(operation = %name, error = %e, "Operation failed, state unchanged");
                } else {
                    error!(operation = %name, error = %e, "Invariant violated, keeping last consistent state");
                }
                let severity = if e.is_recoverable() {
                    AlertSeverity::Warning
                } else {
                    AlertSeverity::Error
                };
                Arc::make_mut(&mut self.state).push_alert(Alert::new(severity, name, e.to_string()));
                Err(e)
            }
        }
    }

    fn rel_path(&self, path: &Path) -> Result<String, ApiError> {
        self.state
            .tree
            .relative_path(path)
            .ok_or_else(|| ApiError::PathNotInTree(path.display().to_string()))
    }

    /// Rescan the project from storage, resetting selection and preview
    pub fn reload(&mut self) -> Result<(), ApiError> {
        let root = self.root().to_path_buf();
        let state = Self::load(&self.engine, root)?;
        self.state = Arc::new(state);
        Ok(())
    }

    pub fn on_path_added(&mut self, path: &Path) -> Result<(), ApiError> {
        let rel = self.rel_path(path)?;
        self.transact("path added", |engine, state| engine.on_path_added(state, &rel))
    }

    pub fn on_file_changed(&mut self, path: &Path) -> Result<(), ApiError> {
        let rel = self.rel_path(path)?;
        self.transact("file changed", |engine, state| engine.on_file_changed(state, &rel))
    }

    pub fn on_path_removed(&mut self, path: &Path) -> Result<(), ApiError> {
        let rel = self.rel_path(path)?;
        self.transact("path removed", |engine, state| engine.on_path_removed(state, &rel))
    }

    /// Write `content` to the file at `rel_path`, then take it as the file's content
    pub fn on_save_file_entry(&mut self, rel_path: &str, content: &str) -> Result<(), ApiError> {
        self.transact("save file", |engine, state| engine.save_file(state, rel_path, content))
    }

    /// Write the file holding resource `id`, including unsaved edits to its siblings
    pub fn on_save_resource(&mut self, id: &ResourceId) -> Result<(), ApiError> {
        self.transact("save resource", |engine, state| engine.on_save_resource(state, id))
    }

    /// Replace the text of one resource in memory; the file becomes dirty
    pub fn on_update_resource(&mut self, id: &ResourceId, new_text: &str) -> Result<(), ApiError> {
        self.transact("update resource", |engine, state| {
            engine.on_update_resource(state, id, new_text)
        })
    }

    pub fn select_resource(&mut self, id: &ResourceId) -> Result<(), ApiError> {
        let selection = Selection::Resource { id: id.clone() };
        self.transact("select resource", |engine, state| engine.select(state, selection))
    }

    pub fn select_file_path(&mut self, rel_path: &str) -> Result<(), ApiError> {
        let key = path::normalize_rel_path(rel_path)
            .ok_or_else(|| ApiError::PathNotInTree(rel_path.to_string()))?;
        let selection = Selection::Path { path: key };
        self.transact("select path", |engine, state| engine.select(state, selection))
    }

    pub fn select_helm_values_file(&mut self, id: &str) -> Result<(), ApiError> {
        self.transact("select values file", |engine, state| {
            let path = state
                .helm
                .values
                .get(id)
                .map(|v| v.file_path.clone())
                .ok_or_else(|| ApiError::HelmValuesNotFound(id.to_string()))?;
            engine.select(
                state,
                Selection::HelmValues {
                    id: id.to_string(),
                    path,
                },
            )
        })
    }

    pub fn clear_selections(&mut self) -> Result<(), ApiError> {
        self.transact("clear selection", |engine, state| engine.select(state, Selection::None))
    }

    /// Move the preview session to `Loading`.
    ///
    /// Returns the request to hand to a renderer, or `None` when the same preview is
    /// already loading.
    pub fn start_preview(&mut self, preview_type: PreviewType, target: &str) -> Result<Option<PreviewRequest>, ApiError> {
        self.transact("start preview", |engine, state| {
            engine.on_start_preview(state, preview_type, target)
        })
    }

    /// Admit rendered documents for `ticket`.
    ///
    /// Returns false, changing nothing, when the ticket is stale (superseded or cleared).
    pub fn commit_preview(&mut self, ticket: PreviewTicket, documents: &[RenderedDocument]) -> Result<bool, ApiError> {
        if self.state.preview.pending(ticket).is_none() {
            debug!(%ticket, "Discarding stale preview result");
            return Ok(false);
        }
        self.transact("commit preview", |engine, state| {
            engine.on_commit_preview(state, ticket, documents)
        })?;
        Ok(true)
    }

    /// Abandon the load for `ticket`; the reason is surfaced as an alert.
    ///
    /// Returns false when the ticket is stale.
    pub fn fail_preview(&mut self, ticket: PreviewTicket, reason: &str) -> Result<bool, ApiError> {
        if self.state.preview.pending(ticket).is_none() {
            debug!(%ticket, "Discarding stale preview failure");
            return Ok(false);
        }
        self.transact("fail preview", |engine, state| {
            engine.on_fail_preview(state, ticket, reason);
            Ok(())
        })?;
        Ok(true)
    }

    pub fn clear_preview(&mut self) -> Result<(), ApiError> {
        if matches!(self.state.preview.state, PreviewState::Idle) {
            return Ok(());
        }
        self.transact("clear preview", |engine, state| {
            engine.on_clear_preview(state);
            Ok(())
        })
    }

    /// Dispatch one event. A `StartPreview` that needs rendering yields its request.
    pub fn apply(&mut self, event: WorkspaceEvent) -> Result<Option<PreviewRequest>, ApiError> {
        debug!(event = event.name(), "Applying event");
        match event {
            WorkspaceEvent::PathAdded(path) => self.on_path_added(&path)?,
            WorkspaceEvent::FileChanged(path) => self.on_file_changed(&path)?,
            WorkspaceEvent::PathRemoved(path) => self.on_path_removed(&path)?,
            WorkspaceEvent::SaveFileEntry { path, content } => {
                self.on_save_file_entry(&path, &content)?
            }
            WorkspaceEvent::SaveResource(id) => self.on_save_resource(&id)?,
            WorkspaceEvent::UpdateResource { id, text } => self.on_update_resource(&id, &text)?,
            WorkspaceEvent::SelectResource(id) => self.select_resource(&id)?,
            WorkspaceEvent::SelectFilePath(path) => self.select_file_path(&path)?,
            WorkspaceEvent::SelectHelmValuesFile(id) => self.select_helm_values_file(&id)?,
            WorkspaceEvent::ClearSelections => self.clear_selections()?,
            WorkspaceEvent::StartPreview {
                preview_type,
                target,
            } => return self.start_preview(preview_type, &target),
            WorkspaceEvent::PreviewRendered { ticket, result } => {
                match result {
                    Ok(documents) => self.commit_preview(ticket, &documents)?,
                    Err(reason) => self.fail_preview(ticket, &reason)?,
                };
            }
            WorkspaceEvent::ClearPreview => self.clear_preview()?,
            WorkspaceEvent::Reload => self.reload()?,
        }
        Ok(None)
    }
}
