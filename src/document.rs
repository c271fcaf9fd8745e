//! Loading workflow documents in either format.

use std::path::Path;

use serde_json::Value;

use crate::convert::convert_with;
use crate::error::{ComfyError, Result};
use crate::graph::{EditorGraph, ExecutionGraph};
use crate::schema::WidgetSchema;

/// Which serialization a workflow document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Editor save file with `nodes` and `links` arrays.
    Editor,
    /// API format keyed by node id.
    Execution,
}

impl DocumentFormat {
    /// A document is editor-format when it has both a `nodes` and a `links` key.
    pub fn detect(doc: &Value) -> Self {
        match doc.as_object() {
            Some(obj) if obj.contains_key("nodes") && obj.contains_key("links") => {
                DocumentFormat::Editor
            }
            _ => DocumentFormat::Execution,
        }
    }
}

/// A loaded workflow, always held in execution format.
#[derive(Debug, Clone)]
pub struct WorkflowDocument {
    pub format: DocumentFormat,
    pub graph: ExecutionGraph,
}

impl WorkflowDocument {
    /// Build from an already-parsed JSON document, converting editor files.
    pub fn from_value(doc: Value, schema: &WidgetSchema) -> Result<Self> {
        let format = DocumentFormat::detect(&doc);
        let graph = match format {
            DocumentFormat::Editor => {
                let editor: EditorGraph = serde_json::from_value(doc)?;
                convert_with(&editor, schema)
            }
            DocumentFormat::Execution => serde_json::from_value(doc)?,
        };
        Ok(Self { format, graph })
    }

    pub fn parse(text: &str, schema: &WidgetSchema) -> Result<Self> {
        Self::from_value(serde_json::from_str(text)?, schema)
    }

    pub fn from_path(path: &Path, schema: &WidgetSchema) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ComfyError::Document {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text, schema)
    }
}
