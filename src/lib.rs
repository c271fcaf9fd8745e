//! # comfyui-workflow
//!
//! Async Rust client for running saved [ComfyUI](https://github.com/comfyanonymous/ComfyUI)
//! workflows.
//!
//! Loads a workflow in either the editor format (`workflow.json`, converted
//! automatically) or the API format (`workflow_api.json`), lets you edit
//! node inputs by title, submits the job, waits for it over the WebSocket
//! push channel or by polling history, and returns decoded outputs keyed by
//! the node titles you asked for.
//!
//! ## Quick Start
//!
//! ```no_run
//! use comfyui_workflow::{ClientConfig, WaitStrategy, WorkflowClient};
//!
//! # async fn example() -> comfyui_workflow::Result<()> {
//! let config = ClientConfig::builder("127.0.0.1:8188")
//!     .with_strategy(WaitStrategy::Push)
//!     .build();
//!
//! let mut client = WorkflowClient::new(config);
//! client.load_path("workflow.json")?;
//! client.connect().await?;
//!
//! client.set_seed("KSampler", 1234);
//! client.set_text("CLIP Text Encode Positive", "beautiful landscape painting");
//!
//! for (title, artifacts) in client.run(&["Result Image"]).await? {
//!     for (i, out) in artifacts.images.iter().enumerate() {
//!         if let Some(image) = &out.image {
//!             image.save(format!("{}_{}.png", title, i)).ok();
//!         }
//!     }
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Converting without a server
//!
//! ```
//! use comfyui_workflow::{convert, EditorGraph, InputValue};
//!
//! let editor: EditorGraph = serde_json::from_str(r#"{
//!     "nodes": [
//!         {"id": 4, "type": "CheckpointLoaderSimple", "widgets_values": ["sd15.safetensors"]},
//!         {"id": 8, "type": "VAEDecode", "inputs": [{"name": "vae", "link": 1}]}
//!     ],
//!     "links": [[1, 4, 2, 8, 1, "VAE"]]
//! }"#).unwrap();
//!
//! let graph = convert(&editor);
//! assert_eq!(graph.get("8").unwrap().inputs["vae"], InputValue::NodeRef("4".into(), 2));
//! ```

pub mod client;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod graph;
pub mod index;
pub mod notification;
pub mod runner;
pub mod schema;
pub mod session;
pub mod transport;
pub mod types;

pub use client::WorkflowClient;
pub use config::{ClientConfig, ClientConfigBuilder, WaitStrategy};
pub use convert::{convert, convert_with};
pub use document::{DocumentFormat, WorkflowDocument};
pub use error::{ComfyError, Result};
pub use graph::{EditorGraph, EditorNode, ExecNode, ExecutionGraph, InputSlot, InputValue, Link, NodeMeta};
pub use index::NodeIndex;
pub use notification::{parse_notification, Notification};
pub use runner::{CompletionWatcher, JobRunner, JobState, PollCompletion, PushCompletion};
pub use schema::WidgetSchema;
pub use session::Session;
pub use transport::{
    ApiRequest, ApiResponse, HttpTransport, Method, NotificationSource, RequestBody, Transport,
    WsNotifications,
};
pub use types::{
    HistoryEntry, ImageRef, JobResult, JobSubmission, NamedOutputs, NodeArtifacts,
    NodeOutputRecord, OutputImage, SubmitResponse, UploadResponse,
};
