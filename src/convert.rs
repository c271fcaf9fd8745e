//! Editor-format to execution-format conversion.

use std::collections::HashMap;

use serde_json::Value;

use crate::graph::{EditorGraph, EditorNode, ExecNode, ExecutionGraph, InputValue};
use crate::schema::{WidgetSchema, SEED_CONTROL};

/// Convert an editor-format workflow using the builtin [`WidgetSchema`].
///
/// # Example
/// ```
/// use comfyui_workflow::{convert, EditorGraph};
///
/// let editor: EditorGraph = serde_json::from_str(r#"{
///     "nodes": [{"id": 3, "type": "KSampler",
///                "widgets_values": [12345, "fixed", 20, 7.5, "euler", "normal", 1.0]}],
///     "links": []
/// }"#).unwrap();
///
/// let graph = convert(&editor);
/// let node = graph.get("3").unwrap();
/// assert_eq!(node.inputs["seed"].as_literal(), Some(&serde_json::json!(12345)));
/// assert!(!node.inputs.contains_key("seed_control"));
/// ```
pub fn convert(editor: &EditorGraph) -> ExecutionGraph {
    convert_with(editor, &WidgetSchema::default())
}

/// Convert an editor-format workflow with a caller-supplied widget schema.
///
/// Never fails: widget values beyond the schema and schema names without a
/// value are skipped, and links to unknown link ids become `null` inputs.
pub fn convert_with(editor: &EditorGraph, schema: &WidgetSchema) -> ExecutionGraph {
    let links: HashMap<u64, (String, u32)> = editor
        .links
        .iter()
        .map(|l| (l.id, (l.source_node.to_string(), l.source_slot)))
        .collect();

    let mut graph = ExecutionGraph::new();
    for node in &editor.nodes {
        graph.insert(node.id.to_string(), convert_node(node, schema, &links));
    }
    graph
}

fn convert_node(
    node: &EditorNode,
    schema: &WidgetSchema,
    links: &HashMap<u64, (String, u32)>,
) -> ExecNode {
    let title = node.title.as_deref().unwrap_or(&node.node_type);
    let mut exec = ExecNode::new(&node.node_type, title);

    for (name, value) in schema.params(&node.node_type).iter().zip(&node.widget_values) {
        if name == SEED_CONTROL {
            continue;
        }
        exec.inputs
            .insert(name.clone(), InputValue::Literal(value.clone()));
    }

    // Link inputs are written second; a name already set by a widget is overwritten.
    for slot in &node.inputs {
        let Some(link_id) = slot.link else {
            continue;
        };
        let value = match links.get(&link_id) {
            Some((source, source_slot)) => InputValue::NodeRef(source.clone(), *source_slot),
            None => {
                tracing::warn!(
                    node_id = node.id,
                    input = %slot.name,
                    link_id,
                    "Input references an unknown link"
                );
                InputValue::Literal(Value::Null)
            }
        };
        exec.inputs.insert(input_name(&slot.name), value);
    }

    exec
}

/// Editor socket labels map to API input names: lowercase, spaces as underscores.
fn input_name(label: &str) -> String {
    label.to_lowercase().replace(' ', "_")
}
