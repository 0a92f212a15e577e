use crate::integration::common::*;
use manifest_sync::error::ApiError;
use manifest_sync::helm::helm_id;
use manifest_sync::pipeline::ProjectState;
use manifest_sync::selection::Selection;

const CHART: &str = "apiVersion: v2\nname: web-chart\nversion: 0.1.0\n";

fn selected_entries(state: &ProjectState) -> Vec<String> {
    state
        .tree
        .iter()
        .filter(|e| e.is_selected)
        .map(|e| e.rel_path.clone())
        .collect()
}

fn highlighted_entries(state: &ProjectState) -> Vec<String> {
    state
        .tree
        .iter()
        .filter(|e| e.is_highlighted)
        .map(|e| e.rel_path.clone())
        .collect()
}

fn project() -> (std::sync::Arc<manifest_sync::storage::MemoryStorage>, manifest_sync::Pipeline) {
    let web = format!("{}---\n{}", DEPLOYMENT_WEB, SERVICE_WEB);
    open(&[
        ("apps/web/web.yaml", web.as_str()),
        ("apps/web/config/cm.yaml", config_map("web-config").as_str()),
        ("apps/api/svc.yaml", SERVICE_API),
        ("charts/web/Chart.yaml", CHART),
        ("charts/web/values.yaml", "replicaCount: 1\n"),
        ("charts/web/values-prod.yaml", "replicaCount: 3\n"),
    ])
}

#[test]
fn selecting_a_resource_highlights_linked_resources() {
    let (_storage, mut pipeline) = project();
    let service = id_of(&pipeline.snapshot(), "Service", "web-svc");

    pipeline.select_resource(&service).unwrap();

    let state = pipeline.snapshot();
    assert_eq!(state.selection, Selection::Resource { id: service.clone() });
    assert!(state.resources.get(&service).unwrap().is_selected);
    assert_eq!(highlighted_names(&state), vec!["web"]);
    assert_eq!(highlighted_entries(&state), vec!["apps/web/web.yaml"]);
    assert!(selected_entries(&state).is_empty());
}

#[test]
fn links_are_highlighted_in_both_directions() {
    let (_storage, mut pipeline) = project();
    let deployment = id_of(&pipeline.snapshot(), "Deployment", "web");

    pipeline.select_resource(&deployment).unwrap();

    assert_eq!(highlighted_names(&pipeline.snapshot()), vec!["web-svc"]);
}

#[test]
fn selecting_a_folder_highlights_everything_below_it() {
    let (_storage, mut pipeline) = project();

    pipeline.select_file_path("apps/web").unwrap();

    let state = pipeline.snapshot();
    assert_eq!(selected_entries(&state), vec!["apps/web"]);
    assert_eq!(highlighted_entries(&state), vec!["", "apps"]);
    assert_eq!(highlighted_names(&state), vec!["web", "web-config", "web-svc"]);
}

#[test]
fn selecting_a_file_highlights_only_its_resources() {
    let (_storage, mut pipeline) = project();

    pipeline.select_file_path("apps/api/svc.yaml").unwrap();

    let state = pipeline.snapshot();
    assert_eq!(selected_entries(&state), vec!["apps/api/svc.yaml"]);
    assert_eq!(highlighted_names(&state), vec!["api-svc"]);
    assert!(state.resources.iter().all(|r| !r.is_selected));
}

#[test]
fn new_selection_replaces_the_previous_one() {
    let (_storage, mut pipeline) = project();
    pipeline.select_file_path("apps/web").unwrap();
    let api = id_of(&pipeline.snapshot(), "Service", "api-svc");

    pipeline.select_resource(&api).unwrap();

    let state = pipeline.snapshot();
    assert!(selected_entries(&state).is_empty());
    assert!(highlighted_names(&state).is_empty());
    assert_eq!(highlighted_entries(&state), vec!["apps/api/svc.yaml"]);
    assert_eq!(state.resources.iter().filter(|r| r.is_selected).count(), 1);
}

#[test]
fn helm_values_selection_is_exclusive() {
    let (_storage, mut pipeline) = project();
    let values = helm_id("charts/web/values.yaml");
    let prod = helm_id("charts/web/values-prod.yaml");

    pipeline.select_helm_values_file(&values).unwrap();
    let state = pipeline.snapshot();
    assert!(state.helm.values[&values].is_selected);
    assert!(!state.helm.values[&prod].is_selected);
    assert_eq!(selected_entries(&state), vec!["charts/web/values.yaml"]);

    pipeline.select_helm_values_file(&prod).unwrap();
    let state = pipeline.snapshot();
    assert!(!state.helm.values[&values].is_selected);
    assert!(state.helm.values[&prod].is_selected);

    let deployment = id_of(&state, "Deployment", "web");
    pipeline.select_resource(&deployment).unwrap();
    let state = pipeline.snapshot();
    assert!(state.helm.values.values().all(|v| !v.is_selected));
}

#[test]
fn chart_is_detected_with_its_values_files() {
    let (_storage, pipeline) = project();
    let state = pipeline.snapshot();
    let chart = &state.helm.charts[&helm_id("charts/web/Chart.yaml")];
    assert_eq!(chart.name, "web-chart");
    assert_eq!(chart.values_file_ids.len(), 2);
}

#[test]
fn clear_selections_resets_every_flag() {
    let (_storage, mut pipeline) = project();
    pipeline.select_file_path("apps").unwrap();

    pipeline.clear_selections().unwrap();

    let state = pipeline.snapshot();
    assert!(state.selection.is_none());
    assert!(selected_entries(&state).is_empty());
    assert!(highlighted_entries(&state).is_empty());
    assert!(highlighted_names(&state).is_empty());
}

#[test]
fn selecting_a_missing_target_keeps_the_current_selection() {
    let (_storage, mut pipeline) = project();
    pipeline.select_file_path("apps/api").unwrap();

    let missing_path = pipeline.select_file_path("apps/none");
    let missing_values = pipeline.select_helm_values_file("not-an-id");

    assert!(matches!(missing_path, Err(ApiError::PathNotInTree(_))));
    assert!(matches!(missing_values, Err(ApiError::HelmValuesNotFound(_))));
    assert_eq!(selected_entries(&pipeline.snapshot()), vec!["apps/api"]);
}

#[test]
fn selection_follows_edits_to_labels() {
    let (_storage, mut pipeline) = project();
    let state = pipeline.snapshot();
    let web_svc = id_of(&state, "Service", "web-svc");
    let api_svc = id_of(&state, "Service", "api-svc");
    let deployment = id_of(&state, "Deployment", "web");

    pipeline.select_resource(&web_svc).unwrap();
    assert_eq!(highlighted_names(&pipeline.snapshot()), vec!["web"]);

    let renamed = DEPLOYMENT_WEB
        .replace("name: web\nspec", "name: api\nspec")
        .replace("app: web", "app: api");
    pipeline.on_update_resource(&deployment, &renamed).unwrap();

    let state = pipeline.snapshot();
    assert_eq!(state.selection, Selection::Resource { id: web_svc.clone() });
    assert!(highlighted_names(&state).is_empty());
    assert_eq!(state.resources.get(&deployment).unwrap().name, "api");

    pipeline.select_resource(&api_svc).unwrap();
    assert_eq!(highlighted_names(&pipeline.snapshot()), vec!["api"]);
}

#[test]
fn removing_the_selected_file_clears_the_selection() {
    let (storage, mut pipeline) = project();
    pipeline.select_file_path("apps/api/svc.yaml").unwrap();

    storage.remove(abs("apps/api"));
    pipeline.on_path_removed(&abs("apps/api")).unwrap();

    let state = pipeline.snapshot();
    assert!(state.selection.is_none());
    assert!(selected_entries(&state).is_empty());
}
