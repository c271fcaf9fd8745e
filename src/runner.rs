//! Submitting one job, waiting for it, and collecting its outputs.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::config::{ClientConfig, WaitStrategy};
use crate::error::{ComfyError, Result};
use crate::graph::ExecutionGraph;
use crate::notification::Notification;
use crate::session::Session;
use crate::transport::ApiRequest;
use crate::types::{
    HistoryEntry, ImageRef, JobResult, JobSubmission, NodeArtifacts, OutputImage, SubmitResponse,
};

/// Lifecycle of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Submitted,
    /// Waiting on push notifications.
    Awaiting,
    /// Polling history.
    Polling,
    Completed,
    OutputsFetched,
    Failed,
}

/// Strategy for detecting that a submitted job has finished.
#[async_trait]
pub trait CompletionWatcher: Send + Sync {
    /// State a job is in while this watcher waits on it.
    fn waiting_state(&self) -> JobState;

    async fn await_completion(&self, session: &mut Session, prompt_id: &str) -> Result<()>;
}

/// Waits for the `executing` / `node: null` sentinel on the push channel.
#[derive(Debug, Clone, Default)]
pub struct PushCompletion {
    /// Longest gap between notifications; `None` waits indefinitely.
    pub idle_timeout: Option<Duration>,
}

#[async_trait]
impl CompletionWatcher for PushCompletion {
    fn waiting_state(&self) -> JobState {
        JobState::Awaiting
    }

    async fn await_completion(&self, session: &mut Session, prompt_id: &str) -> Result<()> {
        loop {
            let notification = match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, session.receive_notification())
                    .await
                    .map_err(|_| ComfyError::Timeout {
                        prompt_id: prompt_id.to_string(),
                        detail: format!("no notification for {:?}", limit),
                    })??,
                None => session.receive_notification().await?,
            };

            if notification.is_completion_of(prompt_id) {
                tracing::debug!(prompt_id = %prompt_id, "Execution finished");
                return Ok(());
            }
            match notification {
                Notification::Progress { value, max } => {
                    tracing::debug!(prompt_id = %prompt_id, value, max, "Generation progress");
                }
                Notification::ExecutionError {
                    prompt_id: Some(pid),
                    message,
                } if pid == prompt_id => {
                    return Err(ComfyError::ExecutionFailed {
                        prompt_id: pid,
                        message,
                    });
                }
                _ => {}
            }
        }
    }
}

/// Polls `/history/{prompt_id}` until the entry has an `outputs` section.
#[derive(Debug, Clone)]
pub struct PollCompletion {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollCompletion {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 300,
        }
    }
}

#[async_trait]
impl CompletionWatcher for PollCompletion {
    fn waiting_state(&self) -> JobState {
        JobState::Polling
    }

    async fn await_completion(&self, session: &mut Session, prompt_id: &str) -> Result<()> {
        for attempt in 1..=self.max_attempts {
            match has_outputs(session, prompt_id).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                // Transient failures count against the same budget.
                Err(e) => {
                    tracing::debug!(prompt_id = %prompt_id, attempt, error = %e, "History poll failed");
                }
            }
            tokio::time::sleep(self.interval).await;
        }
        Err(ComfyError::Timeout {
            prompt_id: prompt_id.to_string(),
            detail: format!("no outputs after {} polls", self.max_attempts),
        })
    }
}

async fn has_outputs(session: &Session, prompt_id: &str) -> Result<bool> {
    let history: Value = session
        .request(ApiRequest::get(format!("/history/{}", prompt_id)))
        .await?
        .error_for_status()?
        .json()?;
    Ok(history
        .get(prompt_id)
        .and_then(|entry| entry.get("outputs"))
        .is_some())
}

/// Runs jobs: submit, wait for completion, fetch outputs.
pub struct JobRunner {
    watcher: Box<dyn CompletionWatcher>,
    state: JobState,
}

impl JobRunner {
    pub fn new(watcher: Box<dyn CompletionWatcher>) -> Self {
        Self {
            watcher,
            state: JobState::Created,
        }
    }

    /// Pick the watcher matching the configured [`WaitStrategy`].
    pub fn from_config(config: &ClientConfig) -> Self {
        let watcher: Box<dyn CompletionWatcher> = match config.strategy {
            WaitStrategy::Push => Box::new(PushCompletion {
                idle_timeout: config.notification_timeout,
            }),
            WaitStrategy::Poll => Box::new(PollCompletion {
                interval: config.poll_interval,
                max_attempts: config.max_poll_attempts,
            }),
        };
        Self::new(watcher)
    }

    /// State of the most recent job.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Run one job to completion and return its artifacts keyed by node id.
    pub async fn run(&mut self, session: &mut Session, graph: &ExecutionGraph) -> Result<JobResult> {
        self.transition(JobState::Created, None);
        let outcome = self.run_steps(session, graph).await;
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "Job failed");
            self.transition(JobState::Failed, None);
        }
        outcome
    }

    async fn run_steps(&mut self, session: &mut Session, graph: &ExecutionGraph) -> Result<JobResult> {
        let prompt_id = Self::submit(session, graph).await?;
        self.transition(JobState::Submitted, Some(&prompt_id));

        self.transition(self.watcher.waiting_state(), Some(&prompt_id));
        self.watcher.await_completion(session, &prompt_id).await?;
        self.transition(JobState::Completed, Some(&prompt_id));

        let result = Self::collect_outputs(session, &prompt_id).await?;
        self.transition(JobState::OutputsFetched, Some(&prompt_id));
        Ok(result)
    }

    fn transition(&mut self, state: JobState, prompt_id: Option<&str>) {
        tracing::debug!(from = ?self.state, to = ?state, prompt_id, "Job state");
        self.state = state;
    }

    /// Queue a workflow for execution. Returns the `prompt_id`.
    pub async fn submit(session: &Session, graph: &ExecutionGraph) -> Result<String> {
        let body = serde_json::to_value(JobSubmission {
            prompt: graph,
            client_id: session.client_id(),
        })?;
        let resp: SubmitResponse = session
            .request(ApiRequest::post_json("/prompt", body))
            .await?
            .error_for_status()?
            .json()?;

        if let Some(errors) = resp.node_errors.as_ref().and_then(Value::as_object) {
            if !errors.is_empty() {
                return Err(ComfyError::NodeErrors(
                    serde_json::to_string_pretty(errors).unwrap_or_default(),
                ));
            }
        }

        let prompt_id = resp
            .prompt_id
            .ok_or_else(|| ComfyError::Protocol("Response missing prompt_id".into()))?;
        tracing::info!(prompt_id = %prompt_id, queue_number = ?resp.number, "Prompt queued");
        Ok(prompt_id)
    }

    /// Fetch the history record of a finished job and download every output.
    ///
    /// Images are decoded when possible; undecodable artifacts keep only their bytes.
    pub async fn collect_outputs(session: &Session, prompt_id: &str) -> Result<JobResult> {
        let mut history: IndexMap<String, HistoryEntry> = session
            .request(ApiRequest::get(format!("/history/{}", prompt_id)))
            .await?
            .error_for_status()?
            .json()?;

        let outputs = history
            .shift_remove(prompt_id)
            .ok_or_else(|| ComfyError::Protocol(format!("History has no entry for {}", prompt_id)))?
            .outputs
            .ok_or_else(|| ComfyError::Protocol(format!("History entry {} has no outputs", prompt_id)))?;

        let mut result = JobResult::new();
        for (node_id, record) in outputs {
            if record.images.is_none() && record.text.is_none() {
                continue;
            }
            let mut artifacts = NodeArtifacts {
                images: Vec::new(),
                text: record.text,
            };
            for reference in record.images.unwrap_or_default() {
                let bytes = Self::fetch_image(session, &reference).await?;
                let image = match image::load_from_memory(&bytes) {
                    Ok(image) => Some(image),
                    Err(e) => {
                        tracing::warn!(
                            prompt_id = %prompt_id,
                            node_id = %node_id,
                            filename = %reference.filename,
                            error = %e,
                            "Output is not a decodable image; keeping raw bytes"
                        );
                        None
                    }
                };
                artifacts.images.push(OutputImage {
                    reference,
                    bytes,
                    image,
                });
            }
            result.insert(node_id, artifacts);
        }

        tracing::info!(prompt_id = %prompt_id, nodes = result.len(), "Collected outputs");
        Ok(result)
    }

    /// Download an output image by its reference. Returns raw bytes.
    pub async fn fetch_image(session: &Session, img: &ImageRef) -> Result<Vec<u8>> {
        let request = ApiRequest::get("/view")
            .query("filename", &img.filename)
            .query("subfolder", &img.subfolder)
            .query("type", &img.folder_type);
        let resp = session.request(request).await?.error_for_status()?;
        Ok(resp.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_picks_watcher() {
        let push = JobRunner::from_config(&ClientConfig::new("localhost:8188"));
        assert_eq!(push.watcher.waiting_state(), JobState::Awaiting);

        let poll = JobRunner::from_config(
            &ClientConfig::builder("localhost:8188")
                .with_strategy(WaitStrategy::Poll)
                .build(),
        );
        assert_eq!(poll.watcher.waiting_state(), JobState::Polling);
        assert_eq!(poll.state(), JobState::Created);
    }

    #[test]
    fn test_poll_defaults() {
        let poll = PollCompletion::default();
        assert_eq!(poll.interval, Duration::from_secs(1));
        assert_eq!(poll.max_attempts, 300);
    }
}
