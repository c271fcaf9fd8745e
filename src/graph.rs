//! The two workflow graph formats.
//!
//! [`EditorGraph`] is what the ComfyUI editor saves (`workflow.json`): a
//! list of nodes with positional widget values plus a separate link table.
//! [`ExecutionGraph`] is what `/prompt` accepts (`workflow_api.json`): a map
//! from node id to class type and named inputs.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

// ── Editor format ───────────────────────────────────────────────────

/// A workflow as saved by the ComfyUI editor.
#[derive(Debug, Clone, Deserialize)]
pub struct EditorGraph {
    pub nodes: Vec<EditorNode>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// One node of an editor-format workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct EditorNode {
    pub id: i64,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Positional widget values, mapped to names by [`WidgetSchema`](crate::WidgetSchema).
    #[serde(default, rename = "widgets_values", deserialize_with = "positional_values")]
    pub widget_values: Vec<Value>,
    #[serde(default)]
    pub inputs: Vec<InputSlot>,
}

/// A declared input socket on an editor node.
#[derive(Debug, Clone, Deserialize)]
pub struct InputSlot {
    pub name: String,
    #[serde(default, rename = "type")]
    pub data_type: Option<Value>,
    #[serde(default)]
    pub link: Option<u64>,
}

/// An edge from one node's output slot to another node's input slot.
///
/// Editor files store links as `[id, source, source_slot, target, target_slot, type]`.
/// The object form used by newer editor builds is accepted too.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawLink")]
pub struct Link {
    pub id: u64,
    pub source_node: i64,
    pub source_slot: u32,
    pub target_node: i64,
    pub target_slot: u32,
    pub data_type: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLink {
    Tuple(Vec<Value>),
    Object {
        id: u64,
        origin_id: i64,
        origin_slot: u32,
        target_id: i64,
        target_slot: u32,
        #[serde(default, rename = "type")]
        data_type: Value,
    },
}

impl TryFrom<RawLink> for Link {
    type Error = String;

    fn try_from(raw: RawLink) -> Result<Self, Self::Error> {
        match raw {
            RawLink::Object {
                id,
                origin_id,
                origin_slot,
                target_id,
                target_slot,
                data_type,
            } => Ok(Link {
                id,
                source_node: origin_id,
                source_slot: origin_slot,
                target_node: target_id,
                target_slot,
                data_type,
            }),
            RawLink::Tuple(items) => {
                let int = |i: usize| items.get(i).and_then(Value::as_i64);
                let (Some(id), Some(source_node), Some(source_slot)) = (int(0), int(1), int(2))
                else {
                    return Err(format!("malformed link entry: {:?}", items));
                };
                Ok(Link {
                    id: u64::try_from(id).map_err(|_| format!("negative link id {}", id))?,
                    source_node,
                    source_slot: u32::try_from(source_slot)
                        .map_err(|_| format!("invalid source slot {}", source_slot))?,
                    target_node: int(3).unwrap_or_default(),
                    target_slot: int(4).and_then(|s| u32::try_from(s).ok()).unwrap_or_default(),
                    data_type: items.get(5).cloned().unwrap_or(Value::Null),
                })
            }
        }
    }
}

/// Some custom nodes store widget state as an object; those carry no positional values.
fn positional_values<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(values) => values,
        _ => Vec::new(),
    })
}

// ── Execution format ────────────────────────────────────────────────

/// A workflow in the API format accepted by `/prompt`, keyed by node id.
///
/// Iteration follows document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionGraph {
    nodes: IndexMap<String, ExecNode>,
}

impl ExecutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node_id: impl Into<String>, node: ExecNode) {
        self.nodes.insert(node_id.into(), node);
    }

    pub fn get(&self, node_id: &str) -> Option<&ExecNode> {
        self.nodes.get(node_id)
    }

    pub fn get_mut(&mut self, node_id: &str) -> Option<&mut ExecNode> {
        self.nodes.get_mut(node_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExecNode)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Serialize to the JSON value sent as the `prompt` field.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// One node of an execution-format workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecNode {
    pub class_type: String,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NodeMeta>,
    #[serde(default)]
    pub inputs: IndexMap<String, InputValue>,
    /// Fields this crate does not interpret, kept so documents round-trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecNode {
    pub fn new(class_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            meta: Some(NodeMeta {
                title: title.into(),
                extra: Map::new(),
            }),
            inputs: IndexMap::new(),
            extra: Map::new(),
        }
    }

    /// The node's display title, empty when the document carries none.
    pub fn title(&self) -> &str {
        self.meta.as_ref().map(|m| m.title.as_str()).unwrap_or("")
    }
}

/// Editor metadata carried along in the `_meta` field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named input on an execution node: either a literal or a reference to
/// another node's output slot (serialized as `["<node id>", <slot>]`).
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Literal(Value),
    NodeRef(String, u32),
}

impl InputValue {
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            InputValue::Literal(v) => Some(v),
            InputValue::NodeRef(..) => None,
        }
    }

    pub fn as_node_ref(&self) -> Option<(&str, u32)> {
        match self {
            InputValue::NodeRef(id, slot) => Some((id.as_str(), *slot)),
            InputValue::Literal(_) => None,
        }
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        if let Value::Array(items) = &value {
            if let [Value::String(node_id), Value::Number(slot)] = items.as_slice() {
                if let Some(slot) = slot.as_u64().and_then(|s| u32::try_from(s).ok()) {
                    return InputValue::NodeRef(node_id.clone(), slot);
                }
            }
        }
        InputValue::Literal(value)
    }
}

impl Serialize for InputValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InputValue::Literal(v) => v.serialize(serializer),
            InputValue::NodeRef(node_id, slot) => (node_id, slot).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for InputValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(InputValue::from)
    }
}
