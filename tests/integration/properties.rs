use crate::integration::common::*;
use manifest_sync::extract::{extract, ExtractionConfig};
use manifest_sync::helm::helm_id;
use manifest_sync::pipeline::{Pipeline, ProjectState};
use manifest_sync::preview::{PreviewType, RenderedDocument};
use manifest_sync::types::{Origin, ResourceId};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn document() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(|name| config_map(&name)),
        "[a-z]{1,8}".prop_map(|name| format!(
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: {}\n  namespace: team\n",
            name
        )),
        Just("# just a comment\n".to_string()),
        Just("replicas: 3\n".to_string()),
        Just("kind: [broken\n".to_string()),
    ]
}

fn file_content() -> impl Strategy<Value = String> {
    prop::collection::vec(document(), 0..5).prop_map(|docs| docs.join("---\n"))
}

fn local_ids(state: &ProjectState, rel_path: &str) -> Vec<ResourceId> {
    state.resources.ids_for_path(rel_path)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn file_changes_converge_to_latest_content(contents in prop::collection::vec(file_content(), 1..6)) {
        let (storage, mut pipeline) = open(&[("a.yaml", "")]);
        for content in &contents {
            storage.insert_file(abs("a.yaml"), content);
            pipeline.on_file_changed(&abs("a.yaml")).unwrap();
        }

        let latest = contents.last().unwrap();
        let expected: BTreeSet<ResourceId> =
            extract(latest, "a.yaml", Origin::Local, &ExtractionConfig::default())
                .resources
                .into_iter()
                .map(|r| r.id)
                .collect();
        let state = pipeline.snapshot();
        let actual = local_ids(&state, "a.yaml");
        let unique: BTreeSet<ResourceId> = actual.iter().cloned().collect();
        prop_assert_eq!(actual.len(), unique.len());
        prop_assert_eq!(unique, expected);
        prop_assert_eq!(state.resources.len(), actual.len());
    }

    #[test]
    fn ranges_are_ordered_and_disjoint(content in file_content()) {
        let (_storage, pipeline) = open(&[("a.yaml", content.as_str())]);
        let state = pipeline.snapshot();
        let resources = state.resources.resources_for_path("a.yaml");
        for pair in resources.windows(2) {
            prop_assert!(pair[0].doc_index < pair[1].doc_index);
            prop_assert!(pair[0].range.end() <= pair[1].range.start);
        }
        for resource in &resources {
            prop_assert_eq!(&content[resource.range.start..resource.range.end()], resource.text.as_str());
        }
    }

    #[test]
    fn preview_transitions_keep_one_origin_and_locals_intact(ops in prop::collection::vec(preview_op(), 1..12)) {
        let (_storage, mut pipeline) = open(&[
            ("overlay/kustomization.yaml", "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\n"),
            ("charts/web/Chart.yaml", "apiVersion: v2\nname: web\n"),
            ("charts/web/values.yaml", "replicaCount: 1\n"),
            ("cm.yaml", config_map("local").as_str()),
        ]);
        let locals = local_view(&pipeline);
        let kustomization = id_of(&pipeline.snapshot(), "Kustomization", "overlay");
        let mut tickets = Vec::new();

        for op in ops {
            match op {
                PreviewOp::Start(preview_type) => {
                    let target = match preview_type {
                        PreviewType::Kustomization => kustomization.to_string(),
                        PreviewType::Helm => helm_id("charts/web/values.yaml"),
                        PreviewType::Cluster => "ctx".to_string(),
                    };
                    if let Some(request) = pipeline.start_preview(preview_type, &target).unwrap() {
                        tickets.push(request.ticket);
                    }
                }
                PreviewOp::Commit { back, count } => {
                    if let Some(ticket) = tickets.iter().rev().nth(back).copied() {
                        let documents: Vec<RenderedDocument> = (0..count)
                            .map(|i| RenderedDocument {
                                path: format!("out-{}.yaml", i),
                                text: config_map(&format!("p{}", i)),
                            })
                            .collect();
                        pipeline.commit_preview(ticket, &documents).unwrap();
                    }
                }
                PreviewOp::Fail { back } => {
                    if let Some(ticket) = tickets.iter().rev().nth(back).copied() {
                        pipeline.fail_preview(ticket, "render failed").unwrap();
                    }
                }
                PreviewOp::Clear => pipeline.clear_preview().unwrap(),
            }

            let state = pipeline.snapshot();
            let origins: BTreeSet<&str> = state
                .resources
                .iter()
                .filter(|r| r.origin.is_preview())
                .map(|r| r.origin.as_str())
                .collect();
            prop_assert!(origins.len() <= 1);
            prop_assert_eq!(local_view(&pipeline), locals.clone());
            prop_assert!(state.check_invariants().is_ok());
        }
    }
}

#[derive(Debug, Clone)]
enum PreviewOp {
    Start(PreviewType),
    Commit { back: usize, count: usize },
    Fail { back: usize },
    Clear,
}

fn preview_op() -> impl Strategy<Value = PreviewOp> {
    prop_oneof![
        prop_oneof![
            Just(PreviewType::Kustomization),
            Just(PreviewType::Helm),
            Just(PreviewType::Cluster)
        ]
        .prop_map(PreviewOp::Start),
        (0usize..2, 0usize..4).prop_map(|(back, count)| PreviewOp::Commit { back, count }),
        (0usize..2).prop_map(|back| PreviewOp::Fail { back }),
        Just(PreviewOp::Clear),
    ]
}

fn local_view(pipeline: &Pipeline) -> Vec<(ResourceId, String)> {
    pipeline
        .snapshot()
        .resources
        .iter()
        .filter(|r| r.origin == Origin::Local)
        .map(|r| (r.id.clone(), r.text.clone()))
        .collect()
}
