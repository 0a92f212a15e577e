//! Rendering pipelines
//!
//! The template engines are external programs. A [`PreviewRenderer`] turns a
//! [`PreviewRequest`] into rendered documents; [`CommandRenderer`] does so by running the
//! configured commands and parsing their stdout.

use crate::error::ApiError;
use crate::extract::split_documents;
use crate::preview::{PreviewConfig, PreviewTicket, PreviewType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// One document produced by a rendering pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDocument {
    /// Logical path; prefixed with the preview marker when admitted
    pub path: String,
    pub text: String,
}

/// Everything a renderer needs to produce a preview
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    pub ticket: PreviewTicket,
    pub preview_type: PreviewType,
    /// Kustomization resource id, values file id, or cluster context name
    pub target: String,
    /// Kustomization folder or values file on disk; `None` for cluster previews
    pub input: Option<PathBuf>,
}

impl PreviewRequest {
    /// Logical path given to every document of this render
    pub fn output_label(&self) -> String {
        format!("{}/{}", self.preview_type, self.target)
    }
}

#[async_trait]
pub trait PreviewRenderer: Send + Sync {
    async fn render(&self, request: &PreviewRequest) -> Result<Vec<RenderedDocument>, ApiError>;
}

/// Split renderer output into documents.
///
/// Accepts multi-document YAML or a JSON list object (`{"items": [...]}`, as printed by
/// `kubectl get -o json`). Every document gets `label` as its path.
pub fn parse_rendered_output(output: &str, label: &str) -> Result<Vec<RenderedDocument>, ApiError> {
    let trimmed = output.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let value: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|e| ApiError::ParseError(format!("invalid JSON render output: {}", e)))?;
        let items = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut object) => match object.remove("items") {
                Some(serde_json::Value::Array(items)) => items,
                Some(_) => {
                    return Err(ApiError::ParseError(
                        "render output 'items' is not a list".to_string(),
                    ))
                }
                None => vec![serde_json::Value::Object(object)],
            },
            _ => {
                return Err(ApiError::ParseError(
                    "render output is neither a list nor an object".to_string(),
                ))
            }
        };
        return items
            .iter()
            .map(|item| -> Result<RenderedDocument, ApiError> {
                let text = serde_yaml::to_string(item)?;
                Ok(RenderedDocument {
                    path: label.to_string(),
                    text,
                })
            })
            .collect();
    }

    Ok(split_documents(output)
        .into_iter()
        .map(|span| &output[span.start..span.end])
        .filter(|text| !text.trim().is_empty())
        .map(|text| RenderedDocument {
            path: label.to_string(),
            text: text.to_string(),
        })
        .collect())
}

/// Runs the configured kustomize, helm and cluster commands
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    config: PreviewConfig,
}

impl CommandRenderer {
    pub fn new(config: PreviewConfig) -> Self {
        Self { config }
    }

    /// Program and arguments for a request
    pub fn command_line(&self, request: &PreviewRequest) -> Result<Vec<String>, ApiError> {
        let input = || {
            request.input.as_ref().ok_or_else(|| {
                ApiError::InvalidPreviewTarget {
                    preview_type: request.preview_type.to_string(),
                    target: request.target.clone(),
                }
            })
        };
        let mut line = match request.preview_type {
            PreviewType::Kustomization => {
                let mut line = self.config.kustomize_command.clone();
                line.push(input()?.display().to_string());
                line
            }
            PreviewType::Helm => {
                let values = input()?;
                let chart = values.parent().map(PathBuf::from).unwrap_or_default();
                let mut line = self.config.helm_command.clone();
                line.push(chart.display().to_string());
                line.push("-f".to_string());
                line.push(values.display().to_string());
                line
            }
            PreviewType::Cluster => {
                let mut line = self.config.cluster_command.clone();
                line.push("--context".to_string());
                line.push(request.target.clone());
                line
            }
        };
        if line.is_empty() {
            return Err(ApiError::ConfigError(format!(
                "no {} preview command configured",
                request.preview_type
            )));
        }
        line.retain(|arg| !arg.is_empty());
        Ok(line)
    }
}

#[async_trait]
impl PreviewRenderer for CommandRenderer {
    async fn render(&self, request: &PreviewRequest) -> Result<Vec<RenderedDocument>, ApiError> {
        let line = self.command_line(request)?;
        let (program, args) = line
            .split_first()
            .ok_or_else(|| ApiError::ConfigError("empty preview command".to_string()))?;
        info!(ticket = %request.ticket, program = %program, "Running preview command");

        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            command.output(),
        )
        .await
        .map_err(|_| {
            ApiError::PreviewFailed(format!(
                "{} timed out after {}s",
                program, self.config.timeout_secs
            ))
        })?
        .map_err(|e| ApiError::PreviewFailed(format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ApiError::PreviewFailed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }
        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| ApiError::PreviewFailed(format!("{} printed non-UTF-8 output", program)))?;
        let documents = parse_rendered_output(&stdout, &request.output_label())?;
        debug!(ticket = %request.ticket, documents = documents.len(), "Preview rendered");
        Ok(documents)
    }
}
