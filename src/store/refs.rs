//! Cross-reference rules and link computation
//!
//! Which fields link one resource to another is data, not code: every link comes from a
//! `ReferenceRule`. The default rule set covers the common Kubernetes relations.

use crate::error::ApiError;
use crate::store::resource::{RefDirection, RefKind, RefTarget, Resource, ResourceRef};
use crate::tree::path;
use crate::types::ResourceId;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// How the value found at a rule's path identifies its targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RefMatcher {
    /// The value is the target's name
    Name,
    /// The value is an object with `kind` and `name`
    KindAndName,
    /// Like `KindAndName`, read from `metadata.ownerReferences`
    OwnerReference,
    /// The value is a label map; targets match when their labels (read from the first
    /// of `target_labels` that holds a map) contain every pair
    Selector { target_labels: Vec<String> },
    /// The value is a file or folder path relative to the source file's folder
    File,
}

impl RefMatcher {
    fn ref_kind(&self) -> RefKind {
        match self {
            RefMatcher::Name | RefMatcher::KindAndName => RefKind::Name,
            RefMatcher::OwnerReference => RefKind::Owner,
            RefMatcher::Selector { .. } => RefKind::Selector,
            RefMatcher::File => RefKind::File,
        }
    }
}

/// One configurable link rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRule {
    pub name: String,
    /// Kinds the rule is evaluated on; empty means every kind
    #[serde(default)]
    pub source_kinds: Vec<String>,
    /// Field paths in the source document, e.g. `spec.volumes[*].configMap.name`
    pub paths: Vec<String>,
    /// Kinds a link may point at; empty means every kind
    #[serde(default)]
    pub target_kinds: Vec<String>,
    pub matcher: RefMatcher,
}

impl ReferenceRule {
    fn applies_to(&self, kind: &str) -> bool {
        self.source_kinds.is_empty() || self.source_kinds.iter().any(|k| k == kind)
    }

    fn may_target(&self, kind: &str) -> bool {
        self.target_kinds.is_empty() || self.target_kinds.iter().any(|k| k == kind)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::ConfigError(
                "Reference rule name cannot be empty".to_string(),
            ));
        }
        if self.paths.is_empty() {
            return Err(ApiError::ConfigError(format!(
                "Reference rule '{}' has no paths",
                self.name
            )));
        }
        let mut all_paths: Vec<&String> = self.paths.iter().collect();
        if let RefMatcher::Selector { target_labels } = &self.matcher {
            if target_labels.is_empty() {
                return Err(ApiError::ConfigError(format!(
                    "Selector rule '{}' needs at least one target_labels path",
                    self.name
                )));
            }
            all_paths.extend(target_labels);
        }
        for field_path in all_paths {
            if field_path.split('.').any(|segment| segment.is_empty()) {
                return Err(ApiError::ConfigError(format!(
                    "Reference rule '{}' has malformed path '{}'",
                    self.name, field_path
                )));
            }
        }
        Ok(())
    }
}

/// Link rules used by `ResourceMap::reprocess`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub rules: Vec<ReferenceRule>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

impl ReferenceConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut names = BTreeSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !names.insert(rule.name.as_str()) {
                return Err(ApiError::ConfigError(format!(
                    "Duplicate reference rule '{}'",
                    rule.name
                )));
            }
        }
        Ok(())
    }
}

fn rule(
    name: &str,
    source_kinds: &[&str],
    paths: &[&str],
    target_kinds: &[&str],
    matcher: RefMatcher,
) -> ReferenceRule {
    let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
    ReferenceRule {
        name: name.to_string(),
        source_kinds: owned(source_kinds),
        paths: owned(paths),
        target_kinds: owned(target_kinds),
        matcher,
    }
}

const WORKLOADS: &[&str] = &["Deployment", "StatefulSet", "DaemonSet", "ReplicaSet", "Job"];
const POD_SPEC_HOLDERS: &[&str] = &[
    "Pod",
    "Deployment",
    "StatefulSet",
    "DaemonSet",
    "ReplicaSet",
    "Job",
    "CronJob",
];

/// Pod-spec field paths for Pods, templated workloads and CronJobs
fn pod_spec_paths(suffix: &str) -> Vec<String> {
    ["spec", "spec.template.spec", "spec.jobTemplate.spec.template.spec"]
        .iter()
        .map(|prefix| format!("{}.{}", prefix, suffix))
        .collect()
}

fn pod_spec_rule(name: &str, suffixes: &[&str], target: &str) -> ReferenceRule {
    let mut r = rule(name, POD_SPEC_HOLDERS, &[], &[target], RefMatcher::Name);
    r.paths = suffixes.iter().flat_map(|s| pod_spec_paths(s)).collect();
    r
}

/// Built-in rules
pub fn default_rules() -> Vec<ReferenceRule> {
    vec![
        rule(
            "owner-reference",
            &[],
            &["metadata.ownerReferences[*]"],
            &[],
            RefMatcher::OwnerReference,
        ),
        rule(
            "service-selector",
            &["Service"],
            &["spec.selector"],
            &["Pod", "Deployment", "StatefulSet", "DaemonSet", "ReplicaSet", "Job"],
            RefMatcher::Selector {
                target_labels: vec![
                    "spec.template.metadata.labels".to_string(),
                    "metadata.labels".to_string(),
                ],
            },
        ),
        rule(
            "workload-selector",
            WORKLOADS,
            &["spec.selector.matchLabels"],
            &["Pod"],
            RefMatcher::Selector {
                target_labels: vec!["metadata.labels".to_string()],
            },
        ),
        pod_spec_rule(
            "configmap-ref",
            &[
                "volumes[*].configMap.name",
                "containers[*].envFrom[*].configMapRef.name",
                "containers[*].env[*].valueFrom.configMapKeyRef.name",
            ],
            "ConfigMap",
        ),
        pod_spec_rule(
            "secret-ref",
            &[
                "volumes[*].secret.secretName",
                "containers[*].envFrom[*].secretRef.name",
                "containers[*].env[*].valueFrom.secretKeyRef.name",
                "imagePullSecrets[*].name",
            ],
            "Secret",
        ),
        pod_spec_rule("service-account-ref", &["serviceAccountName"], "ServiceAccount"),
        pod_spec_rule(
            "pvc-ref",
            &["volumes[*].persistentVolumeClaim.claimName"],
            "PersistentVolumeClaim",
        ),
        rule(
            "ingress-backend",
            &["Ingress"],
            &[
                "spec.defaultBackend.service.name",
                "spec.rules[*].http.paths[*].backend.service.name",
            ],
            &["Service"],
            RefMatcher::Name,
        ),
        rule(
            "role-binding",
            &["RoleBinding", "ClusterRoleBinding"],
            &["roleRef", "subjects[*]"],
            &["Role", "ClusterRole", "ServiceAccount"],
            RefMatcher::KindAndName,
        ),
        rule(
            "kustomization-file",
            &["Kustomization"],
            &[
                "resources[*]",
                "bases[*]",
                "components[*]",
                "patchesStrategicMerge[*]",
            ],
            &[],
            RefMatcher::File,
        ),
    ]
}

/// Collect the values at a dotted field path. `name[*]` iterates a sequence and `*`
/// iterates the values of a mapping.
pub fn select_values<'a>(root: &'a Value, field_path: &str) -> Vec<&'a Value> {
    let mut current = vec![root];
    for segment in field_path.split('.') {
        let (key, iterate) = match segment.strip_suffix("[*]") {
            Some(key) => (key, true),
            None => (segment, false),
        };
        let mut next = Vec::new();
        for value in current {
            let stepped: Vec<&Value> = if key == "*" {
                value
                    .as_mapping()
                    .map(|m| m.values().collect())
                    .unwrap_or_default()
            } else {
                value.get(key).into_iter().collect()
            };
            for item in stepped {
                if iterate {
                    if let Some(seq) = item.as_sequence() {
                        next.extend(seq.iter());
                    }
                } else {
                    next.push(item);
                }
            }
        }
        current = next;
    }
    current
}

fn string_map(value: &Value) -> Option<BTreeMap<&str, &str>> {
    let mapping = value.as_mapping()?;
    let mut out = BTreeMap::new();
    for (k, v) in mapping {
        out.insert(k.as_str()?, v.as_str()?);
    }
    Some(out)
}

fn namespaces_compatible(a: &Resource, b: &Resource) -> bool {
    match (&a.namespace, &b.namespace) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

/// Lookup index over one origin group (local or preview)
pub struct RefIndex<'a> {
    by_kind: HashMap<&'a str, Vec<&'a Resource>>,
    by_file: BTreeMap<&'a str, Vec<&'a Resource>>,
}

impl<'a> RefIndex<'a> {
    pub fn build(resources: impl Iterator<Item = &'a Resource>) -> Self {
        let mut by_kind: HashMap<&str, Vec<&Resource>> = HashMap::new();
        let mut by_file: BTreeMap<&str, Vec<&Resource>> = BTreeMap::new();
        for resource in resources {
            by_kind.entry(resource.kind.as_str()).or_default().push(resource);
            by_file
                .entry(resource.file_rel_path.as_str())
                .or_default()
                .push(resource);
        }
        Self { by_kind, by_file }
    }

    fn candidates(&self, rule: &ReferenceRule) -> Vec<&'a Resource> {
        if rule.target_kinds.is_empty() {
            self.by_kind.values().flatten().copied().collect()
        } else {
            rule.target_kinds
                .iter()
                .filter_map(|k| self.by_kind.get(k.as_str()))
                .flatten()
                .copied()
                .collect()
        }
    }

    fn under_path(&self, rel_path: &str) -> Vec<&'a Resource> {
        self.by_file
            .iter()
            .filter(|(file, _)| **file == rel_path || path::is_under(file, rel_path))
            .flat_map(|(_, resources)| resources.iter().copied())
            .collect()
    }
}

fn outgoing(rule: &ReferenceRule, target: RefTarget) -> ResourceRef {
    ResourceRef {
        rule: rule.name.clone(),
        kind: rule.matcher.ref_kind(),
        direction: RefDirection::Outgoing,
        target,
    }
}

/// Compute the outgoing links of `source` against an index of its origin group.
///
/// Values that match nothing are recorded as unresolved targets.
pub fn compute_outgoing(
    source: &Resource,
    rules: &[ReferenceRule],
    index: &RefIndex<'_>,
) -> Vec<ResourceRef> {
    let mut refs = BTreeSet::new();

    for rule in rules.iter().filter(|r| r.applies_to(&source.kind)) {
        for field_path in &rule.paths {
            for value in select_values(&source.content, field_path) {
                match &rule.matcher {
                    RefMatcher::Name => {
                        let Some(name) = value.as_str() else { continue };
                        let hits: Vec<&Resource> = index
                            .candidates(rule)
                            .into_iter()
                            .filter(|t| t.name == name && namespaces_compatible(source, t))
                            .collect();
                        push_hits(&mut refs, rule, source, hits, || RefTarget::Unresolved {
                            kind: rule.target_kinds.first().cloned(),
                            name: name.to_string(),
                        });
                    }
                    RefMatcher::KindAndName | RefMatcher::OwnerReference => {
                        let kind = value.get("kind").and_then(Value::as_str);
                        let name = value.get("name").and_then(Value::as_str);
                        let (Some(kind), Some(name)) = (kind, name) else { continue };
                        if !rule.may_target(kind) {
                            continue;
                        }
                        let hits: Vec<&Resource> = index
                            .by_kind
                            .get(kind)
                            .into_iter()
                            .flatten()
                            .copied()
                            .filter(|t| t.name == name && namespaces_compatible(source, t))
                            .collect();
                        push_hits(&mut refs, rule, source, hits, || RefTarget::Unresolved {
                            kind: Some(kind.to_string()),
                            name: name.to_string(),
                        });
                    }
                    RefMatcher::Selector { target_labels } => {
                        let Some(selector) = string_map(value) else { continue };
                        if selector.is_empty() {
                            continue;
                        }
                        let hits: Vec<&Resource> = index
                            .candidates(rule)
                            .into_iter()
                            .filter(|t| namespaces_compatible(source, t))
                            .filter(|t| {
                                target_labels
                                    .iter()
                                    .flat_map(|p| select_values(&t.content, p))
                                    .find_map(string_map)
                                    .map(|labels| {
                                        selector.iter().all(|(k, v)| labels.get(k) == Some(v))
                                    })
                                    .unwrap_or(false)
                            })
                            .collect();
                        push_hits(&mut refs, rule, source, hits, || {
                            let rendered: Vec<String> =
                                selector.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                            RefTarget::Unresolved {
                                kind: None,
                                name: rendered.join(","),
                            }
                        });
                    }
                    RefMatcher::File => {
                        let Some(reference) = value.as_str() else { continue };
                        let Some(target_path) = path::join(source.folder(), reference) else {
                            continue;
                        };
                        let hits: Vec<&Resource> = index
                            .under_path(&target_path)
                            .into_iter()
                            .filter(|t| rule.may_target(&t.kind))
                            .collect();
                        push_hits(&mut refs, rule, source, hits, || RefTarget::Unresolved {
                            kind: None,
                            name: target_path.clone(),
                        });
                    }
                }
            }
        }
    }

    refs.into_iter().collect()
}

fn push_hits(
    refs: &mut BTreeSet<ResourceRef>,
    rule: &ReferenceRule,
    source: &Resource,
    hits: Vec<&Resource>,
    unresolved: impl FnOnce() -> RefTarget,
) {
    let mut linked = false;
    for target in hits {
        if target.id == source.id {
            continue;
        }
        refs.insert(outgoing(rule, RefTarget::Resource(target.id.clone())));
        linked = true;
    }
    if !linked {
        refs.insert(outgoing(rule, unresolved()));
    }
}

/// Ids of resources that may hold a link to any resource of `kinds`
pub fn potential_sources<'a>(
    rules: &[ReferenceRule],
    kinds: &BTreeSet<&str>,
    resources: impl Iterator<Item = &'a Resource>,
) -> BTreeSet<ResourceId> {
    let relevant: Vec<&ReferenceRule> = rules
        .iter()
        .filter(|r| r.target_kinds.is_empty() || kinds.iter().any(|k| r.may_target(k)))
        .collect();
    resources
        .filter(|r| relevant.iter().any(|rule| rule.applies_to(&r.kind)))
        .map(|r| r.id.clone())
        .collect()
}
