use crate::integration::common::config_map;
use manifest_sync::config::ConfigLoader;
use manifest_sync::pipeline::AlertSeverity;
use manifest_sync::storage::FsStorage;
use manifest_sync::{Pipeline, SyncConfig};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn project_dir() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    fs::create_dir_all(root.join("base")).unwrap();
    fs::write(root.join("base/cm.yaml"), config_map("base-config")).unwrap();
    fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
    fs::write(root.join("node_modules/pkg/cm.yaml"), config_map("vendored")).unwrap();
    (temp, root)
}

fn open(root: &PathBuf, config: &SyncConfig) -> Pipeline {
    Pipeline::open(root, Arc::new(FsStorage::new()), config).unwrap()
}

#[test]
fn scan_honors_ignore_globs() {
    let (_temp, root) = project_dir();
    let pipeline = open(&root, &SyncConfig::default());

    let state = pipeline.snapshot();
    assert!(state.tree.contains("base/cm.yaml"));
    assert!(!state.tree.contains("node_modules"));
    let names: Vec<&str> = state.resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["base-config"]);
}

#[test]
fn watcher_events_with_absolute_paths() {
    let (_temp, root) = project_dir();
    let mut pipeline = open(&root, &SyncConfig::default());

    fs::create_dir_all(root.join("overlays/dev")).unwrap();
    fs::write(root.join("overlays/dev/cm.yaml"), config_map("dev-config")).unwrap();
    pipeline.on_path_added(&root.join("overlays/dev/cm.yaml")).unwrap();
    assert_eq!(pipeline.snapshot().resources.len(), 2);

    fs::write(root.join("overlays/dev/cm.yaml"), config_map("dev-config-v2")).unwrap();
    pipeline.on_file_changed(&root.join("overlays/dev/cm.yaml")).unwrap();
    let state = pipeline.snapshot();
    assert!(state.resources.iter().any(|r| r.name == "dev-config-v2"));
    assert!(state.resources.iter().all(|r| r.name != "dev-config"));

    fs::remove_dir_all(root.join("overlays")).unwrap();
    pipeline.on_path_removed(&root.join("overlays")).unwrap();
    let state = pipeline.snapshot();
    assert_eq!(state.resources.len(), 1);
    assert!(!state.tree.contains("overlays"));
}

#[test]
fn save_writes_through_to_disk() {
    let (_temp, root) = project_dir();
    let mut pipeline = open(&root, &SyncConfig::default());
    let id = pipeline
        .snapshot()
        .resources
        .iter()
        .next()
        .map(|r| r.id.clone())
        .unwrap();

    let edited = config_map("base-config").replace("value", "on-disk");
    pipeline.on_update_resource(&id, &edited).unwrap();
    pipeline.on_save_resource(&id).unwrap();

    assert_eq!(fs::read_to_string(root.join("base/cm.yaml")).unwrap(), edited);
}

#[test]
fn non_utf8_file_is_skipped_with_an_alert() {
    let (_temp, root) = project_dir();
    fs::write(root.join("base/binary.yaml"), [0xff, 0xfe, 0x00, 0x61]).unwrap();

    let mut pipeline = open(&root, &SyncConfig::default());

    let state = pipeline.snapshot();
    assert!(state.tree.contains("base/binary.yaml"));
    assert_eq!(state.resources.len(), 1);
    let alerts = pipeline.take_alerts();
    assert!(alerts
        .iter()
        .any(|a| a.severity == AlertSeverity::Warning && a.title.contains("binary.yaml")));
}

#[test]
fn workspace_config_file_changes_the_scan() {
    let (_temp, root) = project_dir();
    fs::write(root.join("base/extra.yml"), config_map("yml-config")).unwrap();
    fs::write(
        root.join(".manifest-sync.toml"),
        "[scan]\nresource_extensions = [\"yml\"]\n",
    )
    .unwrap();

    let config = ConfigLoader::load(&root).unwrap();
    assert_eq!(config.scan.resource_extensions, vec!["yml".to_string()]);
    let pipeline = open(&root, &config);

    let state = pipeline.snapshot();
    let names: Vec<&str> = state.resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["yml-config"]);
    assert!(state.tree.contains("base/cm.yaml"));
}
