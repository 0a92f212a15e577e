use crate::integration::common::*;
use async_trait::async_trait;
use manifest_sync::error::ApiError;
use manifest_sync::pipeline::WorkspaceEvent;
use manifest_sync::preview::{PreviewRenderer, PreviewRequest, PreviewState, PreviewType, RenderedDocument};
use manifest_sync::runtime::ProjectRuntime;
use manifest_sync::types::Origin;
use std::sync::Arc;
use std::time::Duration;

/// Renders one ConfigMap named after the target; `slow` targets take a while and
/// `broken` targets fail.
struct ScriptedRenderer;

#[async_trait]
impl PreviewRenderer for ScriptedRenderer {
    async fn render(&self, request: &PreviewRequest) -> Result<Vec<RenderedDocument>, ApiError> {
        if request.target.starts_with("slow") {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        if request.target == "broken" {
            return Err(ApiError::PreviewFailed("renderer crashed".to_string()));
        }
        Ok(vec![RenderedDocument {
            path: format!("{}/out.yaml", request.target),
            text: config_map(&request.target),
        }])
    }
}

fn start(files: &[(&str, &str)]) -> (Arc<manifest_sync::storage::MemoryStorage>, ProjectRuntime) {
    let (storage, pipeline) = open(files);
    let runtime = ProjectRuntime::start(pipeline, Arc::new(ScriptedRenderer)).unwrap();
    (storage, runtime)
}

fn preview_names(runtime: &ProjectRuntime) -> Vec<String> {
    runtime
        .snapshot()
        .resources
        .iter()
        .filter(|r| r.origin == Origin::PreviewCluster)
        .map(|r| r.name.clone())
        .collect()
}

#[test]
fn events_are_applied_in_order() {
    let (storage, runtime) = start(&[]);
    let handle = runtime.handle();

    storage.insert_file(abs("cm.yaml"), &config_map("first"));
    handle.send(WorkspaceEvent::PathAdded(abs("cm.yaml"))).unwrap();
    storage.insert_file(abs("cm.yaml"), &config_map("second"));
    handle.send(WorkspaceEvent::FileChanged(abs("cm.yaml"))).unwrap();
    handle.apply(WorkspaceEvent::ClearSelections).unwrap();

    let state = runtime.snapshot();
    let names: Vec<&str> = state.resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["second"]);
    runtime.shutdown();
}

#[test]
fn apply_reports_operation_errors() {
    let (_storage, runtime) = start(&[]);
    let result = runtime
        .handle()
        .apply(WorkspaceEvent::SelectFilePath("missing.yaml".to_string()));
    assert!(matches!(result, Err(ApiError::PathNotInTree(_))));
    runtime.shutdown();
}

#[test]
fn preview_loads_in_the_background() {
    let (_storage, runtime) = start(&[("cm.yaml", config_map("local").as_str())]);

    runtime
        .handle()
        .apply(WorkspaceEvent::StartPreview {
            preview_type: PreviewType::Cluster,
            target: "dev".to_string(),
        })
        .unwrap();

    let state = runtime
        .wait_until(Duration::from_secs(5), |s| {
            matches!(s.preview.state, PreviewState::Active { .. })
        })
        .expect("preview should become active");
    assert_eq!(state.resources.len(), 2);
    assert_eq!(preview_names(&runtime), vec!["dev"]);
    runtime.shutdown();
}

#[test]
fn newer_preview_wins_over_a_slow_one() {
    let (_storage, runtime) = start(&[]);
    let handle = runtime.handle();

    handle
        .apply(WorkspaceEvent::StartPreview {
            preview_type: PreviewType::Cluster,
            target: "slow-old".to_string(),
        })
        .unwrap();
    handle
        .apply(WorkspaceEvent::StartPreview {
            preview_type: PreviewType::Cluster,
            target: "fast-new".to_string(),
        })
        .unwrap();

    runtime
        .wait_until(Duration::from_secs(5), |s| {
            matches!(&s.preview.state, PreviewState::Active { target, .. } if target == "fast-new")
        })
        .expect("newer preview should become active");

    // Let the superseded render finish; its result must be dropped
    std::thread::sleep(Duration::from_millis(600));
    let state = runtime.snapshot();
    assert!(matches!(&state.preview.state, PreviewState::Active { target, .. } if target == "fast-new"));
    assert_eq!(preview_names(&runtime), vec!["fast-new"]);
    runtime.shutdown();
}

#[test]
fn failing_render_returns_to_idle() {
    let (_storage, runtime) = start(&[]);

    runtime
        .handle()
        .apply(WorkspaceEvent::StartPreview {
            preview_type: PreviewType::Cluster,
            target: "broken".to_string(),
        })
        .unwrap();

    let state = runtime
        .wait_until(Duration::from_secs(5), |s| !s.preview.state.is_loading())
        .expect("failed preview should settle");
    assert_eq!(state.preview.state, PreviewState::Idle);
    assert!(state
        .alerts
        .iter()
        .any(|a| a.message.contains("renderer crashed")));
    runtime.shutdown();
}

#[test]
fn clearing_during_a_load_discards_the_result() {
    let (_storage, runtime) = start(&[]);
    let handle = runtime.handle();

    handle
        .apply(WorkspaceEvent::StartPreview {
            preview_type: PreviewType::Cluster,
            target: "slow-cancelled".to_string(),
        })
        .unwrap();
    handle.apply(WorkspaceEvent::ClearPreview).unwrap();

    std::thread::sleep(Duration::from_millis(600));
    let state = runtime.snapshot();
    assert_eq!(state.preview.state, PreviewState::Idle);
    assert!(preview_names(&runtime).is_empty());
    runtime.shutdown();
}

#[test]
fn handle_fails_after_shutdown() {
    let (_storage, runtime) = start(&[]);
    let handle = runtime.handle();
    runtime.shutdown();

    assert!(matches!(
        handle.send(WorkspaceEvent::ClearSelections),
        Err(ApiError::RuntimeStopped)
    ));
    assert!(matches!(
        handle.apply(WorkspaceEvent::Reload),
        Err(ApiError::RuntimeStopped)
    ));
}
