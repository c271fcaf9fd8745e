use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by workflow loading, job submission, and output collection.
///
/// Title lookups that miss are not errors: they surface as `None` from
/// [`NodeIndex::find_by_title`](crate::NodeIndex::find_by_title) and the
/// input setters on [`WorkflowClient`](crate::WorkflowClient).
#[derive(Error, Debug)]
pub enum ComfyError {
    /// ComfyUI returned a non-success HTTP status.
    #[error("ComfyUI returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Connection {
        context: String,
        source: reqwest::Error,
    },

    /// The push-notification WebSocket failed.
    #[error("{context}: {source}")]
    WebSocket {
        context: String,
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    /// The push-notification channel closed while a job was being awaited.
    #[error("Notification channel closed")]
    ConnectionClosed,

    /// An operation needed an open session but none was connected.
    #[error("Client is not connected; call connect() first")]
    NotConnected,

    /// A well-formed response was missing an expected field.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The queued workflow had node-level errors.
    #[error("Workflow node errors: {0}")]
    NodeErrors(String),

    /// ComfyUI reported an execution error for the awaited job.
    #[error("Prompt {prompt_id} failed: {message}")]
    ExecutionFailed { prompt_id: String, message: String },

    /// A response body could not be parsed.
    #[error("Invalid response body: {0}")]
    Decode(String),

    /// Timed out waiting for the job to complete.
    #[error("Timed out waiting for prompt {prompt_id}: {detail}")]
    Timeout { prompt_id: String, detail: String },

    /// The workflow document could not be read.
    #[error("Failed to read workflow document {}: {source}", path.display())]
    Document {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No workflow graph has been loaded successfully.
    #[error("No workflow loaded")]
    NoWorkflow,

    /// An output artifact could not be decoded or an input image encoded.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ComfyError {
    pub(crate) fn websocket(
        context: impl Into<String>,
        source: tokio_tungstenite::tungstenite::Error,
    ) -> Self {
        ComfyError::WebSocket {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// True for failures of the transport itself rather than of the payload.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ComfyError::Http { .. }
                | ComfyError::Connection { .. }
                | ComfyError::WebSocket { .. }
                | ComfyError::ConnectionClosed
                | ComfyError::NotConnected
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ComfyError>;
