use std::time::Duration;

/// How a job's completion is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Wait for the completion sentinel on the `/ws` push channel.
    #[default]
    Push,
    /// Poll `/history/{prompt_id}` at a fixed interval.
    Poll,
}

/// Configuration for a [`WorkflowClient`](crate::WorkflowClient).
///
/// Use [`ClientConfig::builder()`] for ergonomic construction, or
/// [`ClientConfig::new()`] for defaults (push strategy, 1 s × 300 polling budget).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Normalized HTTP base URL, e.g. `http://127.0.0.1:8188`.
    pub endpoint: String,

    /// Completion detection strategy.
    pub strategy: WaitStrategy,

    /// Delay between history polls.
    pub poll_interval: Duration,

    /// History polls before giving up with a timeout.
    pub max_poll_attempts: u32,

    /// Per-request HTTP timeout.
    pub request_timeout: Duration,

    /// Longest silence tolerated on the push channel (`None` = wait forever).
    pub notification_timeout: Option<Duration>,

    /// Server subfolder that uploaded assets are stored in.
    pub upload_subfolder: String,

    /// Fixed client id; a random UUID is generated when unset.
    pub client_id: Option<String>,
}

impl ClientConfig {
    /// Defaults for the given server address (`host:port` or a full URL).
    pub fn new(endpoint: impl AsRef<str>) -> Self {
        Self {
            endpoint: normalize(endpoint.as_ref()),
            strategy: WaitStrategy::Push,
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 300,
            request_timeout: Duration::from_secs(30),
            notification_timeout: None,
            upload_subfolder: "temp".to_string(),
            client_id: None,
        }
    }

    /// Start building a config with the builder pattern.
    pub fn builder(endpoint: impl AsRef<str>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::new(endpoint),
        }
    }

    /// Push-channel URL for `client_id`, e.g. `ws://127.0.0.1:8188/ws?clientId=...`.
    pub fn ws_url(&self, client_id: &str) -> String {
        format!(
            "{}/ws?clientId={}",
            self.endpoint
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1),
            client_id
        )
    }
}

/// Builder for [`ClientConfig`].
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn with_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.config.max_poll_attempts = attempts;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Bound the wait for the next push notification.
    pub fn with_notification_timeout(mut self, timeout: Duration) -> Self {
        self.config.notification_timeout = Some(timeout);
        self
    }

    pub fn with_upload_subfolder(mut self, subfolder: impl Into<String>) -> Self {
        self.config.upload_subfolder = subfolder.into();
        self
    }

    /// Set the client ID used for WebSocket filtering and prompt association.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = Some(id.into());
        self
    }

    /// Build the final [`ClientConfig`].
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

fn normalize(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}
