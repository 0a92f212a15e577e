use crate::integration::common::*;
use manifest_sync::error::ApiError;
use manifest_sync::pipeline::{AlertSeverity, WorkspaceEvent};
use manifest_sync::store::RefTarget;
use manifest_sync::types::EntryKind;
use std::collections::BTreeSet;
use std::path::Path;

#[test]
fn two_documents_yield_two_resources_with_their_own_ranges() {
    let (storage, mut pipeline) = open(&[("a.yaml", DEPLOYMENT_WEB)]);
    let content = format!("{}---\n{}", DEPLOYMENT_WEB, SERVICE_WEB);
    storage.insert_file(abs("a.yaml"), &content);

    pipeline.on_file_changed(Path::new("a.yaml")).unwrap();

    let state = pipeline.snapshot();
    let resources = state.resources.resources_for_path("a.yaml");
    assert_eq!(resources.len(), 2);
    assert_ne!(resources[0].id, resources[1].id);
    assert_eq!(resources[0].kind, "Deployment");
    assert_eq!(resources[1].kind, "Service");
    assert_eq!(resources[1].name, "web-svc");

    assert_eq!(resources[0].range.start, 0);
    assert_eq!(resources[1].range.start, DEPLOYMENT_WEB.len() + "---\n".len());
    for resource in &resources {
        assert_eq!(
            &content[resource.range.start..resource.range.end()],
            resource.text
        );
    }
}

#[test]
fn removing_a_folder_cascades_to_entries_and_resources() {
    let two = format!("{}---\n{}", config_map("one"), config_map("two"));
    let (storage, mut pipeline) = open(&[
        ("manifests/a.yaml", two.as_str()),
        ("manifests/sub/b.yaml", config_map("three").as_str()),
        ("keep.yaml", config_map("kept").as_str()),
    ]);
    assert_eq!(pipeline.snapshot().resources.len(), 4);

    storage.remove(abs("manifests"));
    pipeline.on_path_removed(&abs("manifests")).unwrap();

    let state = pipeline.snapshot();
    assert_eq!(state.resources.len(), 1);
    assert_eq!(find(&state, "ConfigMap", "kept").file_rel_path, "keep.yaml");
    for gone in ["manifests", "manifests/a.yaml", "manifests/sub", "manifests/sub/b.yaml"] {
        assert!(!state.tree.contains(gone), "{} should be gone", gone);
    }
    assert_eq!(state.tree.len(), 2);
}

#[test]
fn path_added_for_known_file_acts_as_change() {
    let (storage, mut pipeline) = open(&[("cm.yaml", config_map("old").as_str())]);
    storage.insert_file(abs("cm.yaml"), &config_map("new"));

    pipeline.on_path_added(&abs("cm.yaml")).unwrap();

    let state = pipeline.snapshot();
    assert_eq!(state.resources.len(), 1);
    assert_eq!(state.resources.iter().next().unwrap().name, "new");
}

#[test]
fn path_added_creates_missing_ancestors() {
    let (storage, mut pipeline) = open(&[]);
    storage.insert_file(abs("deep/er/cm.yaml"), &config_map("deep"));

    pipeline.on_path_added(&abs("deep/er/cm.yaml")).unwrap();

    let state = pipeline.snapshot();
    assert_eq!(state.tree.get("deep").unwrap().kind, EntryKind::Folder);
    assert_eq!(state.tree.get("deep/er").unwrap().kind, EntryKind::Folder);
    assert_eq!(state.resources.len(), 1);
}

#[test]
fn added_folder_is_scanned() {
    let (storage, mut pipeline) = open(&[]);
    storage.insert_file(abs("app/cm.yaml"), &config_map("a"));
    storage.insert_file(abs("app/nested/cm.yaml"), &config_map("b"));

    pipeline.on_path_added(&abs("app")).unwrap();

    let state = pipeline.snapshot();
    assert!(state.tree.contains("app/nested/cm.yaml"));
    assert_eq!(state.resources.len(), 2);
}

#[test]
fn ignored_paths_never_enter_the_tree() {
    let (storage, mut pipeline) = open(&[]);
    storage.insert_file(abs(".git/config.yaml"), &config_map("git"));

    pipeline.on_path_added(&abs(".git/config.yaml")).unwrap();

    let state = pipeline.snapshot();
    assert!(!state.tree.contains(".git"));
    assert!(state.resources.is_empty());
}

#[test]
fn file_replaced_by_folder_evicts_old_resources() {
    let (storage, mut pipeline) = open(&[("conf.yaml", config_map("flat").as_str())]);
    storage.remove(abs("conf.yaml"));
    storage.insert_file(abs("conf.yaml/inner.yaml"), &config_map("inner"));

    pipeline.on_path_added(&abs("conf.yaml")).unwrap();

    let state = pipeline.snapshot();
    assert_eq!(state.tree.get("conf.yaml").unwrap().kind, EntryKind::Folder);
    let names: Vec<&str> = state.resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["inner"]);
}

#[test]
fn malformed_document_is_skipped_and_reported() {
    let content = format!("{}---\nkind: [unclosed\n---\n{}", config_map("first"), config_map("third"));
    let (_storage, mut pipeline) = open(&[("mixed.yaml", content.as_str())]);

    let state = pipeline.snapshot();
    let names: BTreeSet<&str> = state.resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["first", "third"].into_iter().collect());
    let entry = state.tree.get("mixed.yaml").unwrap();
    assert_eq!(entry.extraction_errors.len(), 1);
    assert_eq!(entry.extraction_errors[0].doc_index, 1);

    let alerts = pipeline.take_alerts();
    assert!(alerts.iter().any(|a| a.severity == AlertSeverity::Warning));
    assert!(pipeline.take_alerts().is_empty());
}

#[test]
fn documents_without_kind_are_not_resources() {
    let (_storage, pipeline) = open(&[("values.yaml", "replicaCount: 2\nimage: nginx\n")]);
    let state = pipeline.snapshot();
    assert!(state.resources.is_empty());
    assert!(state.tree.get("values.yaml").unwrap().extraction_errors.is_empty());
}

#[test]
fn unchanged_content_only_refreshes_timestamp() {
    let (storage, mut pipeline) = open(&[("cm.yaml", config_map("same").as_str())]);
    let before = pipeline.snapshot();
    let id = id_of(&before, "ConfigMap", "same");

    storage.insert_file(abs("cm.yaml"), &config_map("same"));
    pipeline.on_file_changed(&abs("cm.yaml")).unwrap();

    let after = pipeline.snapshot();
    assert_eq!(id_of(&after, "ConfigMap", "same"), id);
    assert_ne!(
        before.tree.get("cm.yaml").unwrap().timestamp,
        after.tree.get("cm.yaml").unwrap().timestamp
    );
}

#[test]
fn update_resource_splices_text_and_marks_dirty() {
    let content = format!("{}---\n{}", config_map("one"), config_map("two"));
    let (storage, mut pipeline) = open(&[("cms.yaml", content.as_str())]);
    let id = id_of(&pipeline.snapshot(), "ConfigMap", "one");

    let edited = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: one\ndata:\n  key: changed\n  extra: line";
    pipeline.on_update_resource(&id, edited).unwrap();

    let state = pipeline.snapshot();
    let one = state.resources.get(&id).unwrap();
    assert!(one.is_dirty);
    assert_eq!(one.text, format!("{}\n", edited));

    let entry = state.tree.get("cms.yaml").unwrap();
    assert!(entry.is_dirty);
    let text = entry.text.as_deref().unwrap();
    let two = find(&state, "ConfigMap", "two");
    assert_eq!(&text[two.range.start..two.range.end()], two.text);
    assert!(one.range.end() <= two.range.start);

    // Nothing written yet
    assert_eq!(storage.contents(abs("cms.yaml")).unwrap(), content);
}

#[test]
fn update_adding_a_separator_is_rejected() {
    let content = format!("{}---\n{}", config_map("one"), config_map("two"));
    let (_storage, mut pipeline) = open(&[("cms.yaml", content.as_str())]);
    let before = pipeline.snapshot();
    let id = id_of(&before, "ConfigMap", "one");

    let edited = format!("{}---\n{}", config_map("one"), config_map("sneaky"));
    let result = pipeline.on_update_resource(&id, &edited);

    assert!(matches!(result, Err(ApiError::ParseError(_))));
    let after = pipeline.snapshot();
    assert_eq!(after.resources.get(&id).unwrap().text, before.resources.get(&id).unwrap().text);
    assert!(!after.tree.get("cms.yaml").unwrap().is_dirty);
}

#[test]
fn update_with_invalid_yaml_leaves_state_unchanged() {
    let (_storage, mut pipeline) = open(&[("cm.yaml", config_map("one").as_str())]);
    let id = id_of(&pipeline.snapshot(), "ConfigMap", "one");

    let result = pipeline.on_update_resource(&id, "kind: [broken\n");

    assert!(result.is_err());
    let state = pipeline.snapshot();
    assert_eq!(state.resources.get(&id).unwrap().text, config_map("one"));
    assert!(state
        .alerts
        .iter()
        .any(|a| a.title == "update resource" && a.severity == AlertSeverity::Warning));
}

#[test]
fn save_resource_writes_file_and_clears_dirty() {
    let content = format!("{}---\n{}", config_map("one"), config_map("two"));
    let (storage, mut pipeline) = open(&[("cms.yaml", content.as_str())]);
    let id = id_of(&pipeline.snapshot(), "ConfigMap", "two");

    let edited = config_map("two").replace("value", "saved");
    pipeline.on_update_resource(&id, &edited).unwrap();
    pipeline.on_save_resource(&id).unwrap();

    let written = storage.contents(abs("cms.yaml")).unwrap();
    assert_eq!(written, format!("{}---\n{}", config_map("one"), edited));

    let state = pipeline.snapshot();
    let two = state.resources.get(&id).unwrap();
    assert!(!two.is_dirty);
    assert!(!state.tree.get("cms.yaml").unwrap().is_dirty);
    assert_eq!(state.resources.len(), 2);
}

#[test]
fn save_round_trip_keeps_identities() {
    let content = format!("{}---\n{}---\n{}", DEPLOYMENT_WEB, SERVICE_WEB, config_map("cfg"));
    let (storage, mut pipeline) = open(&[("app.yaml", content.as_str())]);
    let identities = |pipeline: &manifest_sync::Pipeline| -> Vec<(String, String, String, Option<String>)> {
        pipeline
            .snapshot()
            .resources
            .resources_for_path("app.yaml")
            .iter()
            .map(|r| (r.kind.clone(), r.api_version.clone(), r.name.clone(), r.namespace.clone()))
            .collect()
    };
    let before = identities(&pipeline);
    let id = id_of(&pipeline.snapshot(), "Service", "web-svc");

    pipeline.on_save_resource(&id).unwrap();
    storage.insert_file(abs("app.yaml"), &storage.contents(abs("app.yaml")).unwrap());
    pipeline.on_file_changed(&abs("app.yaml")).unwrap();

    assert_eq!(identities(&pipeline), before);
    assert_eq!(storage.contents(abs("app.yaml")).unwrap(), content);
}

#[test]
fn notification_echo_of_own_write_is_not_reapplied() {
    let (storage, mut pipeline) = open(&[("cm.yaml", config_map("one").as_str())]);
    let id = id_of(&pipeline.snapshot(), "ConfigMap", "one");

    // An unsaved edit survives a notification carrying the content last loaded
    pipeline
        .on_update_resource(&id, &config_map("one").replace("value", "draft"))
        .unwrap();
    pipeline.on_file_changed(&abs("cm.yaml")).unwrap();
    let state = pipeline.snapshot();
    assert!(state.resources.get(&id).unwrap().is_dirty);
    assert!(state.resources.get(&id).unwrap().text.contains("draft"));

    pipeline.on_save_resource(&id).unwrap();
    let saved = pipeline.snapshot();
    pipeline.on_file_changed(&abs("cm.yaml")).unwrap();
    let echoed = pipeline.snapshot();
    assert_eq!(
        saved.tree.get("cm.yaml").unwrap().content_hash,
        echoed.tree.get("cm.yaml").unwrap().content_hash
    );
    assert_eq!(storage.contents(abs("cm.yaml")).unwrap(), saved.resources.get(&id).unwrap().text);
}

#[test]
fn failed_write_keeps_edit_dirty() {
    let (storage, mut pipeline) = open(&[("cm.yaml", config_map("one").as_str())]);
    let id = id_of(&pipeline.snapshot(), "ConfigMap", "one");
    pipeline
        .on_update_resource(&id, &config_map("one").replace("value", "pending"))
        .unwrap();

    storage.set_fail_writes(true);
    let result = pipeline.on_save_resource(&id);

    assert!(matches!(result, Err(ApiError::StorageError(_))));
    let state = pipeline.snapshot();
    let resource = state.resources.get(&id).unwrap();
    assert!(resource.is_dirty);
    assert!(resource.text.contains("pending"));
    assert_eq!(storage.contents(abs("cm.yaml")).unwrap(), config_map("one"));
}

#[test]
fn save_to_unknown_path_is_rejected() {
    let (storage, mut pipeline) = open(&[]);
    let result = pipeline.on_save_file_entry("nowhere.yaml", &config_map("x"));
    assert!(matches!(result, Err(ApiError::PathNotInTree(_))));
    assert!(storage.contents(abs("nowhere.yaml")).is_none());
}

#[test]
fn save_file_entry_replaces_resources() {
    let (storage, mut pipeline) = open(&[("cm.yaml", config_map("before").as_str())]);
    let content = format!("{}---\n{}", config_map("after"), config_map("extra"));

    pipeline.on_save_file_entry("cm.yaml", &content).unwrap();

    assert_eq!(storage.contents(abs("cm.yaml")).unwrap(), content);
    let state = pipeline.snapshot();
    let names: BTreeSet<&str> = state.resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["after", "extra"].into_iter().collect());
}

#[test]
fn removing_a_target_leaves_a_dangling_reference() {
    let deployment = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
spec:
  template:
    spec:
      containers:
        - name: app
          envFrom:
            - configMapRef:
                name: app-config
";
    let (storage, mut pipeline) = open(&[
        ("deploy.yaml", deployment),
        ("config.yaml", config_map("app-config").as_str()),
    ]);
    let state = pipeline.snapshot();
    let config_id = id_of(&state, "ConfigMap", "app-config");
    assert!(find(&state, "Deployment", "app")
        .refs
        .iter()
        .any(|r| r.target == RefTarget::Resource(config_id.clone())));

    storage.remove(abs("config.yaml"));
    pipeline.on_path_removed(&abs("config.yaml")).unwrap();

    let state = pipeline.snapshot();
    let refs = &find(&state, "Deployment", "app").refs;
    assert!(refs.iter().all(|r| r.resolved_target().is_none()));
    assert!(refs.iter().any(|r| matches!(&r.target, RefTarget::Unresolved { name, .. } if name == "app-config")));
}

#[test]
fn events_dispatch_through_apply() {
    let (storage, mut pipeline) = open(&[]);
    storage.insert_file(abs("cm.yaml"), &config_map("evented"));

    pipeline.apply(WorkspaceEvent::PathAdded(abs("cm.yaml"))).unwrap();
    let id = id_of(&pipeline.snapshot(), "ConfigMap", "evented");
    pipeline.apply(WorkspaceEvent::SelectResource(id.clone())).unwrap();
    assert!(pipeline.snapshot().resources.get(&id).unwrap().is_selected);

    storage.remove(abs("cm.yaml"));
    pipeline.apply(WorkspaceEvent::PathRemoved(abs("cm.yaml"))).unwrap();
    let state = pipeline.snapshot();
    assert!(state.resources.is_empty());
    assert!(state.selection.is_none());
}

#[test]
fn reload_resets_selection_and_picks_up_disk_state() {
    let (storage, mut pipeline) = open(&[("cm.yaml", config_map("a").as_str())]);
    let id = id_of(&pipeline.snapshot(), "ConfigMap", "a");
    pipeline.select_resource(&id).unwrap();
    storage.insert_file(abs("other.yaml"), &config_map("b"));

    pipeline.reload().unwrap();

    let state = pipeline.snapshot();
    assert!(state.selection.is_none());
    assert_eq!(state.resources.len(), 2);
}

#[test]
fn opening_a_missing_root_fails() {
    let storage = std::sync::Arc::new(manifest_sync::storage::MemoryStorage::new());
    let result = manifest_sync::Pipeline::open(
        Path::new("/manifest-sync-missing-root"),
        storage,
        &manifest_sync::SyncConfig::default(),
    );
    assert!(matches!(result, Err(ApiError::RootNotFound)));
}
