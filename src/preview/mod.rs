//! Preview overlay
//!
//! A preview session lays rendered resources (kustomize, Helm, cluster) over the local
//! resources without touching them. Sessions move through `Idle -> Loading -> Active`
//! and back to `Idle` on clear or failure. Every load carries a ticket; results whose
//! ticket is no longer the one being loaded are discarded.

pub mod render;

pub use render::{parse_rendered_output, CommandRenderer, PreviewRenderer, PreviewRequest, RenderedDocument};

use crate::error::ApiError;
use crate::extract::{extract, ExtractionConfig};
use crate::store::ResourceMap;
use crate::types::{Origin, ResourceId, PREVIEW_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewType {
    Kustomization,
    Helm,
    Cluster,
}

impl PreviewType {
    pub fn origin(self) -> Origin {
        match self {
            PreviewType::Kustomization => Origin::PreviewKustomize,
            PreviewType::Helm => Origin::PreviewHelm,
            PreviewType::Cluster => Origin::PreviewCluster,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PreviewType::Kustomization => "kustomization",
            PreviewType::Helm => "helm",
            PreviewType::Cluster => "cluster",
        }
    }
}

impl fmt::Display for PreviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one preview load request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewTicket(pub u64);

impl fmt::Display for PreviewTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PreviewState {
    #[default]
    Idle,
    Loading {
        preview_type: PreviewType,
        target: String,
        ticket: PreviewTicket,
    },
    Active {
        preview_type: PreviewType,
        target: String,
    },
}

impl PreviewState {
    pub fn is_loading(&self) -> bool {
        matches!(self, PreviewState::Loading { .. })
    }

    pub fn preview_type(&self) -> Option<PreviewType> {
        match self {
            PreviewState::Idle => None,
            PreviewState::Loading { preview_type, .. } | PreviewState::Active { preview_type, .. } => {
                Some(*preview_type)
            }
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            PreviewState::Idle => None,
            PreviewState::Loading { target, .. } | PreviewState::Active { target, .. } => Some(target),
        }
    }
}

/// Outcome of a start request that was not rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStart {
    Started(PreviewTicket),
    /// Same type and target already loading; no new load
    AlreadyLoading(PreviewTicket),
    /// A load for another target was in flight; its result will be discarded
    Superseded {
        ticket: PreviewTicket,
        previous: PreviewTicket,
    },
}

impl PreviewStart {
    pub fn ticket(&self) -> PreviewTicket {
        match self {
            PreviewStart::Started(ticket)
            | PreviewStart::AlreadyLoading(ticket)
            | PreviewStart::Superseded { ticket, .. } => *ticket,
        }
    }

    /// Whether a renderer must be invoked for this start
    pub fn needs_render(&self) -> bool {
        !matches!(self, PreviewStart::AlreadyLoading(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Program and leading arguments; the kustomization folder is appended
    pub kustomize_command: Vec<String>,
    /// Program and leading arguments; the chart folder and `-f <values>` are appended
    pub helm_command: Vec<String>,
    /// Program and leading arguments; `--context <target>` is appended
    pub cluster_command: Vec<String>,
    /// A start for a new target replaces an in-flight load instead of being rejected
    pub supersede_in_flight: bool,
    pub timeout_secs: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        let words = |s: &str| s.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        Self {
            kustomize_command: words("kustomize build"),
            helm_command: words("helm template"),
            cluster_command: words("kubectl get all --all-namespaces -o json"),
            supersede_in_flight: true,
            timeout_secs: 120,
        }
    }
}

impl PreviewConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        for (name, command) in [
            ("kustomize_command", &self.kustomize_command),
            ("helm_command", &self.helm_command),
            ("cluster_command", &self.cluster_command),
        ] {
            if command.first().map(|p| p.trim().is_empty()).unwrap_or(true) {
                return Err(ApiError::ConfigError(format!(
                    "preview.{} must name a program",
                    name
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(ApiError::ConfigError(
                "preview.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Preview state plus the ticket counter
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreviewSession {
    pub state: PreviewState,
    #[serde(skip)]
    last_ticket: u64,
}

impl PreviewSession {
    fn issue_ticket(&mut self) -> PreviewTicket {
        self.last_ticket += 1;
        PreviewTicket(self.last_ticket)
    }

    /// Move to `Loading` for `(preview_type, target)`.
    pub fn start(
        &mut self,
        preview_type: PreviewType,
        target: &str,
        supersede_in_flight: bool,
    ) -> Result<PreviewStart, ApiError> {
        let previous = match &self.state {
            PreviewState::Loading {
                preview_type: loading_type,
                target: loading_target,
                ticket,
            } => {
                if *loading_type == preview_type && loading_target == target {
                    return Ok(PreviewStart::AlreadyLoading(*ticket));
                }
                if !supersede_in_flight {
                    warn!(
                        loading = %loading_target,
                        requested = %target,
                        "Preview already loading, start rejected"
                    );
                    return Err(ApiError::PreviewFailed(format!(
                        "a {} preview of {} is already loading",
                        loading_type, loading_target
                    )));
                }
                Some(*ticket)
            }
            _ => None,
        };

        let ticket = self.issue_ticket();
        self.state = PreviewState::Loading {
            preview_type,
            target: target.to_string(),
            ticket,
        };
        Ok(match previous {
            Some(previous) => {
                warn!(%previous, %ticket, target = %target, "Superseding in-flight preview");
                PreviewStart::Superseded { ticket, previous }
            }
            None => PreviewStart::Started(ticket),
        })
    }

    /// The request a result for `ticket` answers, if it is still the one loading
    pub fn pending(&self, ticket: PreviewTicket) -> Option<(PreviewType, &str)> {
        match &self.state {
            PreviewState::Loading {
                preview_type,
                target,
                ticket: current,
            } if *current == ticket => Some((*preview_type, target)),
            _ => None,
        }
    }

    pub fn activate(&mut self, preview_type: PreviewType, target: &str) {
        self.state = PreviewState::Active {
            preview_type,
            target: target.to_string(),
        };
    }

    pub fn reset(&mut self) {
        self.state = PreviewState::Idle;
    }
}

/// Synthetic file path of a rendered document
pub fn preview_path(path: &str) -> String {
    if path.starts_with(PREVIEW_PREFIX) {
        path.to_string()
    } else {
        format!("{}{}", PREVIEW_PREFIX, path.trim_start_matches('/'))
    }
}

/// Evict every preview resource, then extract `documents` into the map tagged with
/// `origin`.
///
/// Documents sharing a path are treated as consecutive documents of one synthetic file.
/// Returns the ids of the inserted resources and the number of documents that failed
/// to parse.
pub fn admit(
    resources: &mut ResourceMap,
    documents: &[RenderedDocument],
    origin: Origin,
    config: &ExtractionConfig,
) -> Result<(BTreeSet<ResourceId>, usize), ApiError> {
    let evicted = resources.remove_previews();
    debug!(evicted = evicted.len(), "Evicted previous preview resources");

    let mut order = Vec::new();
    let mut files: BTreeMap<String, String> = BTreeMap::new();
    for document in documents {
        let path = preview_path(&document.path);
        let file = files.entry(path.clone()).or_insert_with(|| {
            order.push(path);
            String::new()
        });
        if !file.is_empty() {
            if !file.ends_with('\n') {
                file.push('\n');
            }
            file.push_str("---\n");
        }
        file.push_str(&document.text);
    }

    let mut admitted = BTreeSet::new();
    let mut failed = 0;
    for path in order {
        let text = files.get(&path).map(String::as_str).unwrap_or_default();
        let extraction = extract(text, &path, origin, config);
        failed += extraction.errors.len();
        for resource in extraction.resources {
            if resources.contains(&resource.id) {
                return Err(ApiError::InvariantViolation(format!(
                    "preview resource {} collides with an existing resource",
                    resource.id
                )));
            }
            admitted.insert(resource.id.clone());
            resources.put(resource);
        }
    }
    Ok((admitted, failed))
}
