//! Push notifications from ComfyUI's `/ws` channel.
//!
//! ComfyUI sends JSON frames shaped `{"type": "<kind>", "data": {...}}`.
//! Only the kinds the job runner acts on are typed; everything else is
//! kept as [`Notification::Other`] and ignored.

use serde::Deserialize;
use serde_json::Value;

/// A parsed push notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A node started executing. `node: None` means the prompt finished.
    Executing {
        node: Option<String>,
        prompt_id: Option<String>,
    },
    /// Step progress inside a long-running node.
    Progress { value: u64, max: u64 },
    /// Execution of a prompt failed.
    ExecutionError {
        prompt_id: Option<String>,
        message: String,
    },
    /// Any other message kind.
    Other(String),
}

impl Notification {
    /// True for the completion sentinel of `prompt_id`: executing, no node, same prompt.
    pub fn is_completion_of(&self, prompt_id: &str) -> bool {
        matches!(
            self,
            Notification::Executing { node: None, prompt_id: Some(pid) } if pid == prompt_id
        )
    }
}

#[derive(Deserialize)]
struct RawNotification {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct ExecutingData {
    #[serde(default)]
    node: Option<String>,
    #[serde(default)]
    prompt_id: Option<String>,
}

#[derive(Deserialize)]
struct ProgressData {
    #[serde(default)]
    value: u64,
    #[serde(default)]
    max: u64,
}

#[derive(Deserialize)]
struct ErrorData {
    #[serde(default)]
    prompt_id: Option<String>,
    #[serde(default)]
    exception_message: Option<String>,
}

/// Parse a text frame. Returns `Err` only for malformed JSON or a known
/// kind whose payload has the wrong shape.
pub fn parse_notification(text: &str) -> Result<Notification, serde_json::Error> {
    let raw: RawNotification = serde_json::from_str(text)?;
    Ok(match raw.kind.as_str() {
        "executing" => {
            let data: ExecutingData = serde_json::from_value(raw.data)?;
            Notification::Executing {
                node: data.node,
                prompt_id: data.prompt_id,
            }
        }
        "progress" => {
            let data: ProgressData = serde_json::from_value(raw.data)?;
            Notification::Progress {
                value: data.value,
                max: data.max,
            }
        }
        "execution_error" => {
            let data: ErrorData = serde_json::from_value(raw.data)?;
            Notification::ExecutionError {
                prompt_id: data.prompt_id,
                message: data
                    .exception_message
                    .unwrap_or_else(|| "Unknown error".to_string()),
            }
        }
        _ => Notification::Other(raw.kind),
    })
}
