//! Resource records extracted from manifest files

use crate::error::ApiError;
use crate::extract::ExtractionConfig;
use crate::tree::path;
use crate::types::{Origin, Range, ResourceId};
use serde::Serialize;
use serde_yaml::Value;

/// How a reference links two resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefKind {
    /// `metadata.ownerReferences`
    Owner,
    /// Label selector matching the target's labels
    Selector,
    /// A field holding the target's name
    Name,
    /// A path to the file that holds the target
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefDirection {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefTarget {
    Resource(ResourceId),
    /// Dangling reference, kept for display
    Unresolved { kind: Option<String>, name: String },
}

/// One end of a cross-reference link
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceRef {
    pub rule: String,
    pub kind: RefKind,
    pub direction: RefDirection,
    pub target: RefTarget,
}

impl ResourceRef {
    pub fn resolved_target(&self) -> Option<&ResourceId> {
        match &self.target {
            RefTarget::Resource(id) => Some(id),
            RefTarget::Unresolved { .. } => None,
        }
    }
}

/// A single Kubernetes document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: ResourceId,
    pub kind: String,
    pub api_version: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub file_rel_path: String,
    /// Position of the document among all documents of its file
    pub doc_index: usize,
    pub range: Range,
    pub text: String,
    pub content: Value,
    pub origin: Origin,
    pub is_dirty: bool,
    pub is_selected: bool,
    pub is_highlighted: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<ResourceRef>,
}

/// Identity fields of a parsed document
struct Header {
    kind: String,
    api_version: String,
    name: String,
    namespace: Option<String>,
}

fn string_field<'a>(content: &'a Value, field: &str) -> Option<&'a str> {
    content.get(field).and_then(Value::as_str)
}

fn read_header(content: &Value, file_rel_path: &str, config: &ExtractionConfig) -> Option<Header> {
    if !content.is_mapping() {
        return None;
    }
    let kind = string_field(content, &config.kind_field)?;
    let api_version = string_field(content, &config.api_version_field)?;
    let metadata = content.get("metadata");
    let name = metadata
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| fallback_name(kind, file_rel_path));
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .filter(|ns| !ns.is_empty())
        .map(str::to_string);
    Some(Header {
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        name,
        namespace,
    })
}

/// Kustomizations are usually unnamed; they take the name of their folder.
fn fallback_name(kind: &str, file_rel_path: &str) -> String {
    if kind == "Kustomization" {
        let folder = path::parent_path(file_rel_path).unwrap_or("");
        let name = path::file_name(folder.trim_start_matches(crate::types::PREVIEW_PREFIX));
        if !name.is_empty() {
            return name.to_string();
        }
    }
    "Unnamed".to_string()
}

impl Resource {
    /// Build a resource from a parsed document; `None` unless it carries both a kind
    /// and an api version.
    pub fn from_document(
        content: Value,
        text: &str,
        file_rel_path: &str,
        doc_index: usize,
        range: Range,
        origin: Origin,
        config: &ExtractionConfig,
    ) -> Option<Self> {
        let header = read_header(&content, file_rel_path, config)?;
        let id = ResourceId::derive(
            origin,
            &header.kind,
            &header.api_version,
            header.namespace.as_deref(),
            &header.name,
            file_rel_path,
            doc_index,
        );
        Some(Self {
            id,
            kind: header.kind,
            api_version: header.api_version,
            name: header.name,
            namespace: header.namespace,
            file_rel_path: file_rel_path.to_string(),
            doc_index,
            range,
            text: text.to_string(),
            content,
            origin,
            is_dirty: false,
            is_selected: false,
            is_highlighted: false,
            refs: Vec::new(),
        })
    }

    /// Replace the text of an existing resource, keeping its id.
    pub fn reparse(&mut self, new_text: &str, config: &ExtractionConfig) -> Result<(), ApiError> {
        let content: Value = serde_yaml::from_str(new_text)?;
        let header = read_header(&content, &self.file_rel_path, config).ok_or_else(|| {
            ApiError::ParseError(format!(
                "edited document is missing '{}' or '{}'",
                config.kind_field, config.api_version_field
            ))
        })?;
        self.kind = header.kind;
        self.api_version = header.api_version;
        self.name = header.name;
        self.namespace = header.namespace;
        self.text = new_text.to_string();
        self.content = content;
        Ok(())
    }

    /// `(kind, apiVersion, name, namespace)`
    pub fn identity(&self) -> (&str, &str, &str, Option<&str>) {
        (
            &self.kind,
            &self.api_version,
            &self.name,
            self.namespace.as_deref(),
        )
    }

    pub fn outgoing_refs(&self) -> impl Iterator<Item = &ResourceRef> {
        self.refs
            .iter()
            .filter(|r| r.direction == RefDirection::Outgoing)
    }

    /// Ids of every resource linked to this one in either direction
    pub fn linked_ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.refs.iter().filter_map(ResourceRef::resolved_target)
    }

    /// Folder holding the resource file
    pub fn folder(&self) -> &str {
        path::parent_path(&self.file_rel_path).unwrap_or("")
    }
}
