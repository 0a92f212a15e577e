//! Resource extraction
//!
//! Turns the text of a manifest file into resource records. Malformed documents are
//! skipped and reported; the remaining documents of the file are still extracted.

pub mod split;

pub use split::{split_documents, DocumentSpan};

use crate::error::ExtractionError;
use crate::store::Resource;
use crate::types::{Origin, Range};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

/// Field names that mark a document as a Kubernetes resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub kind_field: String,
    pub api_version_field: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            kind_field: "kind".to_string(),
            api_version_field: "apiVersion".to_string(),
        }
    }
}

/// Resources and structural errors found in one file
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub resources: Vec<Resource>,
    pub errors: Vec<ExtractionError>,
}

impl Extraction {
    /// True when the file had content but not one document parsed
    pub fn is_unparsable(&self) -> bool {
        self.resources.is_empty() && !self.errors.is_empty()
    }
}

impl DocumentSpan {
    pub fn range(&self) -> Range {
        Range {
            start: self.start,
            length: self.end - self.start,
            start_line: self.start_line,
            line_count: self.line_count,
        }
    }
}

/// Only whitespace and comments
fn is_blank_document(text: &str) -> bool {
    text.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}

/// Extract every resource document from `content`
pub fn extract(
    content: &str,
    file_rel_path: &str,
    origin: Origin,
    config: &ExtractionConfig,
) -> Extraction {
    let mut extraction = Extraction::default();

    for span in split_documents(content) {
        let text = &content[span.start..span.end];
        if is_blank_document(text) {
            continue;
        }
        let parsed: Value = match serde_yaml::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                let line = span.start_line + e.location().map(|l| l.line()).unwrap_or(1);
                debug!(
                    path = %file_rel_path,
                    doc_index = span.index,
                    error = %e,
                    "Skipping malformed document"
                );
                extraction.errors.push(ExtractionError {
                    doc_index: span.index,
                    line,
                    message: e.to_string(),
                });
                continue;
            }
        };
        if parsed.is_null() {
            continue;
        }

        match Resource::from_document(
            parsed,
            text,
            file_rel_path,
            span.index,
            span.range(),
            origin,
            config,
        ) {
            Some(resource) => extraction.resources.push(resource),
            None => debug!(
                path = %file_rel_path,
                doc_index = span.index,
                "Document is not a Kubernetes resource"
            ),
        }
    }

    extraction
}
