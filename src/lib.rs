//! manifest-sync: resource/filesystem synchronization for Kubernetes manifests
//!
//! Mirrors a project folder into an in-memory file tree, extracts every Kubernetes
//! document into a resource map, keeps cross-resource links current as files change,
//! and overlays rendered previews (Kustomize, Helm, cluster) without touching local
//! resources. All mutation goes through [`pipeline::Pipeline`]; [`runtime::ProjectRuntime`]
//! runs it behind a single-writer event queue.

pub mod config;
pub mod error;
pub mod extract;
pub mod helm;
pub mod logging;
pub mod pipeline;
pub mod preview;
pub mod runtime;
pub mod selection;
pub mod storage;
pub mod store;
pub mod tooling;
pub mod tree;
pub mod types;
pub mod watch;

pub use config::SyncConfig;
pub use error::ApiError;
pub use pipeline::{Pipeline, ProjectState, WorkspaceEvent};
pub use runtime::{ProjectRuntime, RuntimeHandle};
