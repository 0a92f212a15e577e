//! CLI Tooling
//!
//! Command-line interface over a project: scan, inspect links, render previews, and
//! watch for changes.

use crate::config::{ConfigLoader, SyncConfig};
use crate::error::ApiError;
use crate::helm::helm_id;
use crate::pipeline::{AlertSeverity, Pipeline, ProjectState, WorkspaceEvent};
use crate::preview::{CommandRenderer, PreviewState, PreviewType};
use crate::runtime::ProjectRuntime;
use crate::storage::{FileStorage, FsStorage};
use crate::store::{RefTarget, Resource};
use crate::tree::{path, FileSystemEntry, ScanFilter};
use crate::types::{Origin, ResourceId};
use crate::watch::FsWatcher;
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::Table;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// manifest-sync - keep Kubernetes manifests and their links in sync with the filesystem
#[derive(Parser)]
#[command(name = "manifest-sync")]
#[command(about = "Resource and filesystem synchronization for Kubernetes manifest repositories")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PreviewKind {
    Kustomization,
    Helm,
    Cluster,
}

impl From<PreviewKind> for PreviewType {
    fn from(kind: PreviewKind) -> Self {
        match kind {
            PreviewKind::Kustomization => PreviewType::Kustomization,
            PreviewKind::Helm => PreviewType::Helm,
            PreviewKind::Cluster => PreviewType::Cluster,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the project and list its resources
    Scan {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show the file tree with resource counts
    Tree,
    /// Show the links of every resource with the given name
    Refs {
        name: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// List Helm charts and their values files
    Charts {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Render a preview and list the resources it produced
    Preview {
        #[arg(value_enum)]
        kind: PreviewKind,
        /// Kustomization file or resource id, values file or id, or cluster context
        target: String,
        /// Seconds to wait for the render
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print the effective configuration
    Config,
    /// Watch the project and log every change until interrupted
    Watch {
        /// Debounce window in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
        /// Batch window in milliseconds
        #[arg(long)]
        batch_window_ms: Option<u64>,
    },
}

/// Everything a command needs: the project root and its configuration
pub struct CliContext {
    workspace_root: PathBuf,
    config: SyncConfig,
    storage: Arc<dyn FileStorage>,
}

impl CliContext {
    /// Create a new CLI context
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path).map_err(|e| {
                ApiError::ConfigError(format!(
                    "Failed to load config from {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self::with_config(workspace_root, config))
    }

    pub fn with_config(workspace_root: PathBuf, config: SyncConfig) -> Self {
        let storage = FsStorage::new().with_follow_symlinks(config.scan.follow_symlinks);
        Self {
            workspace_root,
            config,
            storage: Arc::new(storage),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn open(&self) -> Result<Pipeline, ApiError> {
        Pipeline::open(&self.workspace_root, Arc::clone(&self.storage), &self.config)
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Scan { format } => {
                let pipeline = self.open()?;
                format_scan(&pipeline.snapshot(), *format)
            }
            Commands::Tree => {
                let pipeline = self.open()?;
                Ok(format_tree(&pipeline.snapshot()))
            }
            Commands::Refs { name, format } => {
                let pipeline = self.open()?;
                format_refs(&pipeline.snapshot(), name, *format)
            }
            Commands::Charts { format } => {
                let pipeline = self.open()?;
                format_charts(&pipeline.snapshot(), *format)
            }
            Commands::Preview {
                kind,
                target,
                timeout,
                format,
            } => self.preview((*kind).into(), target, *timeout, *format),
            Commands::Config => to_json(&self.config),
            Commands::Watch {
                debounce_ms,
                batch_window_ms,
            } => {
                let mut watch_config = self.config.watch.clone();
                if let Some(debounce_ms) = debounce_ms {
                    watch_config.debounce_ms = *debounce_ms;
                }
                if let Some(batch_window_ms) = batch_window_ms {
                    watch_config.batch_window_ms = *batch_window_ms;
                }
                watch_config.validate()?;

                let pipeline = self.open()?;
                let root = pipeline.root().to_path_buf();
                let renderer = Arc::new(CommandRenderer::new(self.config.preview.clone()));
                let runtime = ProjectRuntime::start(pipeline, renderer)?;
                let handle = runtime.handle();
                let watcher = FsWatcher::new(
                    root,
                    ScanFilter::from_config(&self.config.scan)?,
                    watch_config,
                );

                info!("Starting watch mode");
                watcher.run(|event| handle.send(event))?;
                let snapshot = runtime.snapshot();
                runtime.shutdown();
                Ok(format!(
                    "Watch stopped: {} resources in {} entries",
                    snapshot.resources.len(),
                    snapshot.tree.len()
                ))
            }
        }
    }

    fn preview(
        &self,
        preview_type: PreviewType,
        target: &str,
        timeout: Option<u64>,
        format: OutputFormat,
    ) -> Result<String, ApiError> {
        let pipeline = self.open()?;
        let target = resolve_preview_target(&pipeline.snapshot(), preview_type, target)?;
        let timeout = Duration::from_secs(timeout.unwrap_or(self.config.preview.timeout_secs) + 1);

        let renderer = Arc::new(CommandRenderer::new(self.config.preview.clone()));
        let runtime = ProjectRuntime::start(pipeline, renderer)?;
        runtime.handle().apply(WorkspaceEvent::StartPreview {
            preview_type,
            target: target.clone(),
        })?;
        let settled = runtime.wait_until(timeout, |state| !state.preview.state.is_loading());
        runtime.shutdown();

        let snapshot = settled.ok_or_else(|| {
            ApiError::PreviewFailed(format!("{} preview of {} timed out", preview_type, target))
        })?;
        if !matches!(snapshot.preview.state, PreviewState::Active { .. }) {
            let reason = snapshot
                .alerts
                .iter()
                .rev()
                .find(|a| a.severity == AlertSeverity::Error)
                .map(|a| a.message.clone())
                .unwrap_or_else(|| "preview was cleared".to_string());
            return Err(ApiError::PreviewFailed(reason));
        }

        let origin = preview_type.origin();
        let resources: Vec<&Resource> = snapshot
            .resources
            .iter()
            .filter(|r| r.origin == origin)
            .collect();
        match format {
            OutputFormat::Json => to_json(&resources),
            OutputFormat::Text => Ok(format!(
                "{} preview of {}: {} resources\n{}",
                preview_type,
                target,
                resources.len(),
                resource_table(&resources)
            )),
        }
    }
}

/// Accept a resource id, a kustomization file path, a values file path or id, or a
/// cluster context name
fn resolve_preview_target(
    state: &ProjectState,
    preview_type: PreviewType,
    target: &str,
) -> Result<String, ApiError> {
    match preview_type {
        PreviewType::Kustomization => {
            if state.resources.contains(&ResourceId::from(target)) {
                return Ok(target.to_string());
            }
            let rel = path::normalize_rel_path(target).unwrap_or_default();
            state
                .resources
                .resources_for_path(&rel)
                .into_iter()
                .find(|r| r.kind == "Kustomization")
                .map(|r| r.id.to_string())
                .ok_or_else(|| ApiError::InvalidPreviewTarget {
                    preview_type: preview_type.to_string(),
                    target: target.to_string(),
                })
        }
        PreviewType::Helm => {
            if state.helm.values.contains_key(target) {
                return Ok(target.to_string());
            }
            let rel = path::normalize_rel_path(target).unwrap_or_default();
            Ok(helm_id(&rel))
        }
        PreviewType::Cluster => Ok(target.to_string()),
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::ParseError(format!("Failed to serialize output: {}", e)))
}

fn display_name(resource: &Resource) -> String {
    match &resource.namespace {
        Some(namespace) => format!("{}/{}", namespace, resource.name),
        None => resource.name.clone(),
    }
}

fn target_label(state: &ProjectState, target: &RefTarget) -> String {
    match target {
        RefTarget::Resource(id) => match state.resources.get(id) {
            Some(resource) => format!("{} {}", resource.kind, display_name(resource)),
            None => id.short().to_string(),
        },
        RefTarget::Unresolved { kind, name } => match kind {
            Some(kind) => format!("{} {} (missing)", kind, name),
            None => format!("{} (missing)", name),
        },
    }
}

fn resource_table(resources: &[&Resource]) -> String {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Id", "Kind", "Name", "File", "Links"]);
    for resource in resources {
        let links = resource.outgoing_refs().count();
        let dangling = resource
            .outgoing_refs()
            .filter(|r| r.resolved_target().is_none())
            .count();
        let links = if dangling > 0 {
            format!("{} ({} missing)", links, dangling)
        } else {
            links.to_string()
        };
        let file = match resource.origin {
            Origin::Local => format!("{}#{}", resource.file_rel_path, resource.doc_index),
            _ => resource.file_rel_path.clone(),
        };
        table.add_row(vec![
            resource.id.short().to_string(),
            resource.kind.clone(),
            display_name(resource),
            file,
            links,
        ]);
    }
    table.to_string()
}

fn format_scan(state: &ProjectState, format: OutputFormat) -> Result<String, ApiError> {
    let resources: Vec<&Resource> = state.resources.iter().collect();
    let unparsable: Vec<&FileSystemEntry> = state
        .tree
        .iter()
        .filter(|e| !e.extraction_errors.is_empty())
        .collect();

    if format == OutputFormat::Json {
        let errors: Vec<serde_json::Value> = unparsable
            .iter()
            .map(|e| json!({ "path": e.rel_path, "errors": e.extraction_errors }))
            .collect();
        return to_json(&json!({
            "root": state.tree.root_path(),
            "entries": state.tree.len(),
            "resources": resources,
            "charts": state.helm.charts.values().collect::<Vec<_>>(),
            "errors": errors,
        }));
    }

    let mut output = format!(
        "Scanned {}: {} entries, {} resources, {} charts\n",
        state.tree.root_path().display(),
        state.tree.len(),
        resources.len(),
        state.helm.charts.len()
    );
    output.push_str(&resource_table(&resources));
    if !unparsable.is_empty() {
        output.push_str("\n\nDocuments that could not be parsed:\n");
        for entry in unparsable {
            for error in &entry.extraction_errors {
                output.push_str(&format!("  {}: {}\n", entry.rel_path, error));
            }
        }
    }
    Ok(output)
}

fn format_tree(state: &ProjectState) -> String {
    fn walk(state: &ProjectState, folder: &str, depth: usize, lines: &mut Vec<String>) {
        for entry in state.tree.children(folder) {
            let indent = "  ".repeat(depth);
            if entry.is_folder() {
                lines.push(format!("{}{}/", indent, entry.name));
                walk(state, &entry.rel_path, depth + 1, lines);
            } else {
                let count = state.resources.ids_for_path(&entry.rel_path).len();
                let suffix = match count {
                    0 => String::new(),
                    1 => " (1 resource)".to_string(),
                    n => format!(" ({} resources)", n),
                };
                lines.push(format!("{}{}{}", indent, entry.name, suffix));
            }
        }
    }

    let mut lines = vec![format!("{}", state.tree.root_path().display())];
    walk(state, "", 1, &mut lines);
    lines.join("\n")
}

fn format_refs(state: &ProjectState, name: &str, format: OutputFormat) -> Result<String, ApiError> {
    let matches: Vec<&Resource> = state.resources.iter().filter(|r| r.name == name).collect();
    if matches.is_empty() {
        return Ok(format!("No resource named {}", name));
    }

    if format == OutputFormat::Json {
        let rows: Vec<serde_json::Value> = matches
            .iter()
            .map(|r| json!({ "id": r.id, "kind": r.kind, "file": r.file_rel_path, "refs": r.refs }))
            .collect();
        return to_json(&rows);
    }

    let mut sections = Vec::new();
    for resource in matches {
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Rule", "Direction", "Via", "Target"]);
        for link in &resource.refs {
            table.add_row(vec![
                link.rule.clone(),
                format!("{:?}", link.direction).to_lowercase(),
                format!("{:?}", link.kind).to_lowercase(),
                target_label(state, &link.target),
            ]);
        }
        sections.push(format!(
            "{} {} ({})\n{}",
            resource.kind,
            display_name(resource),
            resource.file_rel_path,
            table
        ));
    }
    Ok(sections.join("\n\n"))
}

fn format_charts(state: &ProjectState, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(&state.helm);
    }
    if state.helm.charts.is_empty() {
        return Ok("No Helm charts found".to_string());
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Chart", "Chart file", "Values file", "Values id"]);
    for chart in state.helm.charts.values() {
        if chart.values_file_ids.is_empty() {
            table.add_row(vec![chart.name.clone(), chart.file_path.clone(), "-".into(), "-".into()]);
        }
        for values in chart
            .values_file_ids
            .iter()
            .filter_map(|id| state.helm.values.get(id))
        {
            table.add_row(vec![
                chart.name.clone(),
                chart.file_path.clone(),
                values.file_path.clone(),
                values.id.clone(),
            ]);
        }
    }
    Ok(table.to_string())
}
