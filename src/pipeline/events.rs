//! Events accepted by the mutation pipeline

use crate::preview::{PreviewTicket, PreviewType, RenderedDocument};
use crate::types::ResourceId;
use std::path::PathBuf;

/// One unit of work for the pipeline.
///
/// Filesystem paths may be absolute or relative to the project root.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkspaceEvent {
    PathAdded(PathBuf),
    FileChanged(PathBuf),
    PathRemoved(PathBuf),
    SaveFileEntry { path: String, content: String },
    SaveResource(ResourceId),
    UpdateResource { id: ResourceId, text: String },
    SelectResource(ResourceId),
    SelectFilePath(String),
    SelectHelmValuesFile(String),
    ClearSelections,
    StartPreview { preview_type: PreviewType, target: String },
    PreviewRendered {
        ticket: PreviewTicket,
        result: Result<Vec<RenderedDocument>, String>,
    },
    ClearPreview,
    /// Rescan the whole project
    Reload,
}

impl WorkspaceEvent {
    /// Short name for log lines
    pub fn name(&self) -> &'static str {
        match self {
            WorkspaceEvent::PathAdded(_) => "path_added",
            WorkspaceEvent::FileChanged(_) => "file_changed",
            WorkspaceEvent::PathRemoved(_) => "path_removed",
            WorkspaceEvent::SaveFileEntry { .. } => "save_file_entry",
            WorkspaceEvent::SaveResource(_) => "save_resource",
            WorkspaceEvent::UpdateResource { .. } => "update_resource",
            WorkspaceEvent::SelectResource(_) => "select_resource",
            WorkspaceEvent::SelectFilePath(_) => "select_file_path",
            WorkspaceEvent::SelectHelmValuesFile(_) => "select_helm_values_file",
            WorkspaceEvent::ClearSelections => "clear_selections",
            WorkspaceEvent::StartPreview { .. } => "start_preview",
            WorkspaceEvent::PreviewRendered { .. } => "preview_rendered",
            WorkspaceEvent::ClearPreview => "clear_preview",
            WorkspaceEvent::Reload => "reload",
        }
    }
}
