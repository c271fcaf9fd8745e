use image::DynamicImage;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::graph::ExecutionGraph;

/// Reference to an image stored in one of ComfyUI's folders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    "output".to_string()
}

/// Body of `POST /prompt`.
#[derive(Debug, Clone, Serialize)]
pub struct JobSubmission<'a> {
    pub prompt: &'a ExecutionGraph,
    pub client_id: &'a str,
}

/// Response of `POST /prompt`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub node_errors: Option<Value>,
}

/// Response of `POST /upload/image`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subfolder: Option<String>,
}

/// One prompt's record in `GET /history/{prompt_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub outputs: Option<IndexMap<String, NodeOutputRecord>>,
    #[serde(default)]
    pub status: Option<Value>,
}

/// Output references recorded for one node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutputRecord {
    #[serde(default)]
    pub images: Option<Vec<ImageRef>>,
    #[serde(default, deserialize_with = "text_output")]
    pub text: Option<Vec<String>>,
}

/// Text nodes report either a list of strings or a single string.
fn text_output<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Many(Vec<Value>),
        One(Value),
    }

    let render = |v: Value| match v {
        Value::String(s) => s,
        other => other.to_string(),
    };

    Ok(match Option::<Text>::deserialize(deserializer)? {
        None => None,
        Some(Text::Many(items)) => Some(items.into_iter().map(render).collect()),
        Some(Text::One(Value::Null)) => None,
        Some(Text::One(v)) => Some(vec![render(v)]),
    })
}

/// A downloaded output artifact listed under `images`.
///
/// Save nodes for video or animation report their files under `images` too,
/// so decoding is best-effort: `image` is `None` when the bytes are not a
/// supported image format, and `bytes` always holds what the server sent.
#[derive(Debug, Clone)]
pub struct OutputImage {
    pub reference: ImageRef,
    pub bytes: Vec<u8>,
    pub image: Option<DynamicImage>,
}

/// Everything one node produced.
#[derive(Debug, Clone, Default)]
pub struct NodeArtifacts {
    pub images: Vec<OutputImage>,
    /// Text outputs as strings. A single value is wrapped in a one-element
    /// list and non-string items are rendered as JSON text.
    pub text: Option<Vec<String>>,
}

impl NodeArtifacts {
    /// The first successfully decoded image, if the node produced any.
    pub fn image(&self) -> Option<&DynamicImage> {
        self.images.iter().find_map(|o| o.image.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.text.is_none()
    }
}

/// Artifacts of one job keyed by node id.
pub type JobResult = IndexMap<String, NodeArtifacts>;

/// Artifacts keyed by the titles the caller asked for.
pub type NamedOutputs = IndexMap<String, NodeArtifacts>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_ref() {
        let img: ImageRef = serde_json::from_value(json!({
            "filename": "ComfyUI_00001_.png", "subfolder": "", "type": "output"
        }))
        .unwrap();
        assert_eq!(img.filename, "ComfyUI_00001_.png");
        assert_eq!(img.folder_type, "output");

        let json = serde_json::to_string(&img).unwrap();
        assert!(json.contains("\"type\":\"output\""));
    }

    #[test]
    fn test_image_ref_defaults() {
        let img: ImageRef = serde_json::from_value(json!({"filename": "a.png"})).unwrap();
        assert_eq!(img.subfolder, "");
        assert_eq!(img.folder_type, "output");
    }

    #[test]
    fn test_parse_history_entry() {
        let entry: HistoryEntry = serde_json::from_str(
            r#"{
            "status": {"status_str": "success", "completed": true},
            "outputs": {
                "9": {"images": [{"filename": "ComfyUI_00001_.png", "subfolder": "", "type": "output"}]},
                "12": {"text": ["a caption"]},
                "13": {"text": "single"}
            }
        }"#,
        )
        .unwrap();
        let outputs = entry.outputs.unwrap();
        assert_eq!(outputs["9"].images.as_ref().unwrap().len(), 1);
        assert!(outputs["9"].text.is_none());
        assert_eq!(outputs["12"].text, Some(vec!["a caption".to_string()]));
        assert_eq!(outputs["13"].text, Some(vec!["single".to_string()]));
    }

    #[test]
    fn test_text_items_rendered_as_strings() {
        let record: NodeOutputRecord =
            serde_json::from_value(json!({"text": ["a", 3, {"k": true}]})).unwrap();
        assert_eq!(
            record.text,
            Some(vec!["a".to_string(), "3".to_string(), r#"{"k":true}"#.to_string()])
        );

        let record: NodeOutputRecord = serde_json::from_value(json!({"text": null})).unwrap();
        assert!(record.text.is_none());
    }

    #[test]
    fn test_history_entry_without_outputs() {
        let entry: HistoryEntry = serde_json::from_str(r#"{"status": {}}"#).unwrap();
        assert!(entry.outputs.is_none());
    }

    #[test]
    fn test_submission_shape() {
        let graph: ExecutionGraph =
            serde_json::from_str(r#"{"1": {"class_type": "VAEDecode", "inputs": {}}}"#).unwrap();
        let body = serde_json::to_value(JobSubmission {
            prompt: &graph,
            client_id: "abc",
        })
        .unwrap();
        assert_eq!(body["client_id"], "abc");
        assert_eq!(body["prompt"]["1"]["class_type"], "VAEDecode");
    }

    #[test]
    fn test_parse_prompt_response() {
        let resp: SubmitResponse = serde_json::from_str(
            r#"{"prompt_id": "abc-123-def", "number": 1, "node_errors": {}}"#,
        )
        .unwrap();
        assert_eq!(resp.prompt_id.as_deref(), Some("abc-123-def"));
        assert_eq!(resp.number, Some(1));
    }
}
