use manifest_sync::pipeline::{Pipeline, ProjectState};
use manifest_sync::storage::MemoryStorage;
use manifest_sync::store::Resource;
use manifest_sync::types::ResourceId;
use manifest_sync::SyncConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Root of the in-memory projects; never present on a real disk
pub const ROOT: &str = "/manifest-sync-test-project";

pub const DEPLOYMENT_WEB: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  selector:
    matchLabels:
      app: web
  template:
    metadata:
      labels:
        app: web
    spec:
      containers:
        - name: web
          image: nginx
";

pub const SERVICE_WEB: &str = "apiVersion: v1
kind: Service
metadata:
  name: web-svc
spec:
  selector:
    app: web
";

pub const SERVICE_API: &str = "apiVersion: v1
kind: Service
metadata:
  name: api-svc
spec:
  selector:
    app: api
";

pub fn config_map(name: &str) -> String {
    format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\ndata:\n  key: value\n", name)
}

pub fn abs(rel: &str) -> PathBuf {
    Path::new(ROOT).join(rel)
}

pub fn storage_with(files: &[(&str, &str)]) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    storage.create_folder(ROOT);
    for (rel, content) in files {
        storage.insert_file(abs(rel), content);
    }
    storage
}

pub fn open_with(files: &[(&str, &str)], config: &SyncConfig) -> (Arc<MemoryStorage>, Pipeline) {
    let storage = storage_with(files);
    let pipeline = Pipeline::open(Path::new(ROOT), storage.clone(), config).unwrap();
    (storage, pipeline)
}

pub fn open(files: &[(&str, &str)]) -> (Arc<MemoryStorage>, Pipeline) {
    open_with(files, &SyncConfig::default())
}

pub fn find<'a>(state: &'a ProjectState, kind: &str, name: &str) -> &'a Resource {
    state
        .resources
        .iter()
        .find(|r| r.kind == kind && r.name == name)
        .unwrap_or_else(|| panic!("no {} named {}", kind, name))
}

pub fn id_of(state: &ProjectState, kind: &str, name: &str) -> ResourceId {
    find(state, kind, name).id.clone()
}

pub fn highlighted_names(state: &ProjectState) -> Vec<String> {
    let mut names: Vec<String> = state
        .resources
        .iter()
        .filter(|r| r.is_highlighted)
        .map(|r| r.name.clone())
        .collect();
    names.sort();
    names
}
