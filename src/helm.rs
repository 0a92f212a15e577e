//! Helm chart and values-file detection
//!
//! A folder holding a `Chart.yaml` is a chart. Files directly inside a chart folder whose
//! name starts with `values` and ends in `.yaml`/`.yml` are its values files. Both maps are
//! derived from the file tree and rebuilt whenever paths are added or removed.

use crate::tree::{path, FileTree};
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

pub const CHART_FILE: &str = "Chart.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmChart {
    pub id: String,
    pub name: String,
    /// Path of the `Chart.yaml` file
    pub file_path: String,
    pub values_file_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmValuesFile {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub chart_id: String,
    pub is_selected: bool,
}

/// Charts and values files keyed by id
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmMaps {
    pub charts: BTreeMap<String, HelmChart>,
    pub values: BTreeMap<String, HelmValuesFile>,
}

/// Stable id of a chart or values file
pub fn helm_id(rel_path: &str) -> String {
    let hash = blake3::hash(rel_path.as_bytes());
    hex::encode(&hash.as_bytes()[..16])
}

fn is_values_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("values") && (lower.ends_with(".yaml") || lower.ends_with(".yml"))
}

fn chart_name(tree: &FileTree, chart_path: &str, folder: &str) -> String {
    tree.get(chart_path)
        .and_then(|entry| entry.text.as_deref())
        .and_then(|text| serde_yaml::from_str::<Value>(text).ok())
        .and_then(|content| content.get("name").and_then(Value::as_str).map(str::to_string))
        .or_else(|| tree.get(folder).map(|entry| entry.name.clone()))
        .unwrap_or_default()
}

impl HelmMaps {
    /// Derive both maps from the tree, keeping the selection flag of values files that
    /// survive.
    pub fn rebuild(&mut self, tree: &FileTree) {
        let mut charts = BTreeMap::new();
        let mut values = BTreeMap::new();

        for entry in tree.iter().filter(|e| e.is_file() && e.name == CHART_FILE) {
            let folder = path::parent_path(&entry.rel_path).unwrap_or("");
            let chart_id = helm_id(&entry.rel_path);
            let mut values_file_ids = Vec::new();

            for child in tree.children(folder) {
                if !child.is_file() || !is_values_file(&child.name) {
                    continue;
                }
                let id = helm_id(&child.rel_path);
                let is_selected = self.values.get(&id).map(|v| v.is_selected).unwrap_or(false);
                values_file_ids.push(id.clone());
                values.insert(
                    id.clone(),
                    HelmValuesFile {
                        id,
                        name: child.name.clone(),
                        file_path: child.rel_path.clone(),
                        chart_id: chart_id.clone(),
                        is_selected,
                    },
                );
            }

            charts.insert(
                chart_id.clone(),
                HelmChart {
                    id: chart_id,
                    name: chart_name(tree, &entry.rel_path, folder),
                    file_path: entry.rel_path.clone(),
                    values_file_ids,
                },
            );
        }

        self.charts = charts;
        self.values = values;
    }

    pub fn values_for_path(&self, rel_path: &str) -> Option<&HelmValuesFile> {
        self.values.values().find(|v| v.file_path == rel_path)
    }

    /// Mark the values file at `rel_path`, if any, as the only selected one
    pub fn select_path(&mut self, rel_path: &str) {
        for values in self.values.values_mut() {
            values.is_selected = values.file_path == rel_path;
        }
    }

    pub fn clear_selection(&mut self) {
        for values in self.values.values_mut() {
            values.is_selected = false;
        }
    }
}
