use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::document::WorkflowDocument;
use crate::error::{ComfyError, Result};
use crate::graph::{ExecutionGraph, InputValue};
use crate::index::NodeIndex;
use crate::runner::{JobRunner, JobState};
use crate::schema::WidgetSchema;
use crate::session::Session;
use crate::transport::ApiRequest;
use crate::types::{NamedOutputs, UploadResponse};

/// The current working graph together with its lookup index.
#[derive(Debug, Clone)]
struct Workflow {
    graph: ExecutionGraph,
    index: NodeIndex,
}

impl Workflow {
    fn new(graph: ExecutionGraph) -> Self {
        let index = NodeIndex::build(&graph);
        Self { graph, index }
    }
}

/// Async client that runs one workflow document against a ComfyUI server.
///
/// Loads a workflow (editor or API format), lets callers edit inputs by
/// node title, runs it, and returns outputs keyed by the titles asked for.
/// One client runs one job at a time; use a client per concurrent job.
///
/// # Example
/// ```no_run
/// use comfyui_workflow::{ClientConfig, WorkflowClient};
///
/// # async fn example() -> comfyui_workflow::Result<()> {
/// let mut client = WorkflowClient::new(ClientConfig::new("127.0.0.1:8188"));
/// client.load_path("workflow.json")?;
/// client.connect().await?;
///
/// client.set_seed("KSampler", 42);
/// client.set_text("CLIP Text Encode Positive", "a lighthouse at dusk");
///
/// let outputs = client.run(&["Result Image"]).await?;
/// if let Some(image) = outputs.get("Result Image").and_then(|a| a.image()) {
///     image.save("result.png").ok();
/// }
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct WorkflowClient {
    config: ClientConfig,
    client_id: String,
    schema: WidgetSchema,
    source: Option<PathBuf>,
    workflow: Option<Workflow>,
    session: Option<Session>,
    runner: JobRunner,
}

impl WorkflowClient {
    /// Create a client with no workflow loaded and no open session.
    pub fn new(config: ClientConfig) -> Self {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let runner = JobRunner::from_config(&config);
        Self {
            config,
            client_id,
            schema: WidgetSchema::default(),
            source: None,
            workflow: None,
            session: None,
            runner,
        }
    }

    /// Create a client and load `path`. A failed load is logged and leaves
    /// the client without a workflow.
    pub fn from_file(config: ClientConfig, path: impl AsRef<Path>) -> Self {
        let mut client = Self::new(config);
        if let Err(e) = client.load_path(path) {
            tracing::debug!(error = %e, "Starting without a workflow");
        }
        client
    }

    /// Use a custom widget schema for editor-format documents loaded afterwards.
    pub fn with_schema(mut self, schema: WidgetSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Client id sent with every prompt and used to scope push notifications.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    // ── Workflow loading ────────────────────────────────────────────

    /// Load a workflow file and remember its path for [`reload`](Self::reload).
    ///
    /// On failure the previous workflow, if any, stays active and `reload`
    /// keeps reading the file it came from.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let loaded = WorkflowDocument::from_path(path, &self.schema);
        self.install(loaded, &path.display().to_string())?;
        self.source = Some(path.to_path_buf());
        Ok(())
    }

    /// Re-read the file given to [`load_path`](Self::load_path).
    pub fn reload(&mut self) -> Result<()> {
        let path = self.source.clone().ok_or(ComfyError::NoWorkflow)?;
        self.load_path(path)
    }

    /// Load an in-memory JSON document.
    pub fn load_value(&mut self, doc: Value) -> Result<()> {
        let loaded = WorkflowDocument::from_value(doc, &self.schema);
        self.install(loaded, "<value>")
    }

    pub fn load_str(&mut self, text: &str) -> Result<()> {
        let loaded = WorkflowDocument::parse(text, &self.schema);
        self.install(loaded, "<string>")
    }

    fn install(&mut self, loaded: Result<WorkflowDocument>, origin: &str) -> Result<()> {
        match loaded {
            Ok(doc) => {
                tracing::info!(
                    origin,
                    format = ?doc.format,
                    nodes = doc.graph.len(),
                    "Loaded workflow"
                );
                self.workflow = Some(Workflow::new(doc.graph));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    origin,
                    error = %e,
                    keeping_previous = self.workflow.is_some(),
                    "Failed to load workflow"
                );
                Err(e)
            }
        }
    }

    /// The current working graph in execution format.
    pub fn workflow(&self) -> Option<&ExecutionGraph> {
        self.workflow.as_ref().map(|w| &w.graph)
    }

    // ── Inputs ──────────────────────────────────────────────────────

    /// Resolve a node id by class type, then by title.
    pub fn find_by_title(&self, title: &str) -> Option<&str> {
        let found = self
            .workflow
            .as_ref()
            .and_then(|w| w.index.find_by_title(title));
        if found.is_none() {
            tracing::debug!(title = %title.trim(), "Node not found");
        }
        found
    }

    /// Write `inputs[field]` on the node resolved from `title`.
    ///
    /// Returns the node id written to, or `None` when the title did not
    /// resolve (nothing is changed in that case).
    pub fn set_input(
        &mut self,
        title: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Option<String> {
        let node_id = self.find_by_title(title)?.to_string();
        let node = self.workflow.as_mut()?.graph.get_mut(&node_id)?;
        node.inputs
            .insert(field.to_string(), InputValue::from(value.into()));
        tracing::debug!(title = %title, node_id = %node_id, field = %field, "Set input");
        Some(node_id)
    }

    /// Set the `text` input, e.g. of a `CLIPTextEncode` node.
    pub fn set_text(&mut self, title: &str, text: impl Into<String>) -> Option<String> {
        self.set_input(title, "text", text.into())
    }

    /// Set the `seed` input, e.g. of a `KSampler` node.
    pub fn set_seed(&mut self, title: &str, seed: u64) -> Option<String> {
        self.set_input(title, "seed", seed)
    }

    /// Set the `Number` input used by primitive number nodes.
    pub fn set_number(&mut self, title: &str, number: f64) -> Option<String> {
        self.set_input(title, "Number", number)
    }

    /// Set the `value` input used by primitive value nodes.
    pub fn set_value(&mut self, title: &str, value: f64) -> Option<String> {
        self.set_input(title, "value", value)
    }

    // ── Session ─────────────────────────────────────────────────────

    /// Open the session. A no-op when one is already open.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let session = Session::open(&self.config, &self.client_id).await?;
        self.session = Some(session);
        Ok(())
    }

    /// Use an already-open session, e.g. one built on a custom transport.
    pub fn attach_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_open)
    }

    /// Close the session. Safe to call when never connected or already closed.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .filter(|s| s.is_open())
            .ok_or(ComfyError::NotConnected)
    }

    // ── Assets ──────────────────────────────────────────────────────

    /// Upload `bytes` as a temporary image and point the resolved node's
    /// `image` input at it.
    ///
    /// Returns `Ok(None)` without uploading when the title does not resolve.
    pub async fn set_asset(&mut self, title: &str, bytes: Vec<u8>) -> Result<Option<String>> {
        let Some(node_id) = self.find_by_title(title).map(str::to_string) else {
            return Ok(None);
        };

        let request = ApiRequest::upload("/upload/image", "image", "temp.png", bytes)
            .form_field("subfolder", &self.config.upload_subfolder);
        let upload: UploadResponse = self
            .session()?
            .request(request)
            .await?
            .error_for_status()?
            .json()?;

        let (Some(name), Some(subfolder)) = (upload.name, upload.subfolder) else {
            return Err(ComfyError::Protocol(
                "Invalid upload response: missing name or subfolder".into(),
            ));
        };
        let path = format!("{}/{}", subfolder, name);
        tracing::debug!(title = %title, node_id = %node_id, path = %path, "Uploaded asset");
        Ok(self.set_input(title, "image", path))
    }

    /// Encode `image` as PNG and upload it with [`set_asset`](Self::set_asset).
    pub async fn set_image(&mut self, title: &str, image: &DynamicImage) -> Result<Option<String>> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        self.set_asset(title, bytes).await
    }

    // ── Run ─────────────────────────────────────────────────────────

    /// Run the current workflow and return the outputs of the requested nodes.
    ///
    /// Each title is resolved like [`find_by_title`](Self::find_by_title).
    /// Titles that do not resolve, or whose node produced nothing, are absent
    /// from the result.
    pub async fn run<S: AsRef<str>>(&mut self, output_titles: &[S]) -> Result<NamedOutputs> {
        let wanted: Vec<(String, String)> = output_titles
            .iter()
            .filter_map(|title| {
                let title = title.as_ref();
                self.find_by_title(title)
                    .map(|id| (id.to_string(), title.to_string()))
            })
            .collect();

        let workflow = self.workflow.as_ref().ok_or(ComfyError::NoWorkflow)?;
        let session = self
            .session
            .as_mut()
            .filter(|s| s.is_open())
            .ok_or(ComfyError::NotConnected)?;
        let result = self.runner.run(session, &workflow.graph).await?;

        // Several titles may resolve to the same node, so entries are cloned.
        let named: NamedOutputs = wanted
            .into_iter()
            .filter_map(|(node_id, title)| result.get(&node_id).map(|a| (title, a.clone())))
            .collect();
        Ok(named)
    }

    /// State of the most recent job.
    pub fn last_job_state(&self) -> JobState {
        self.runner.state()
    }
}
