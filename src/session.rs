use crate::config::{ClientConfig, WaitStrategy};
use crate::error::{ComfyError, Result};
use crate::notification::Notification;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, NotificationSource, Transport, WsNotifications};

/// Open connection(s) to one server for one client id.
///
/// Holds the request/response transport and, for the push strategy, the
/// notification channel. Once closed a session stays closed; open a new one
/// to reconnect.
pub struct Session {
    client_id: String,
    transport: Option<Box<dyn Transport>>,
    notifications: Option<Box<dyn NotificationSource>>,
}

impl Session {
    /// Connect according to `config`. The push strategy also opens `/ws`.
    pub async fn open(config: &ClientConfig, client_id: &str) -> Result<Self> {
        let transport = HttpTransport::new(config.endpoint.clone(), config.request_timeout);
        let notifications: Option<Box<dyn NotificationSource>> = match config.strategy {
            WaitStrategy::Push => {
                let ws = WsNotifications::connect(&config.ws_url(client_id)).await?;
                Some(Box::new(ws))
            }
            WaitStrategy::Poll => None,
        };

        tracing::info!(
            client_id = %client_id,
            strategy = ?config.strategy,
            "Connected to ComfyUI at {}",
            config.endpoint,
        );

        Ok(Self::from_parts(client_id, Box::new(transport), notifications))
    }

    /// Assemble a session from already-open channels.
    pub fn from_parts(
        client_id: impl Into<String>,
        transport: Box<dyn Transport>,
        notifications: Option<Box<dyn NotificationSource>>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            transport: Some(transport),
            notifications,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn has_notifications(&self) -> bool {
        self.notifications.is_some()
    }

    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        match &self.transport {
            Some(transport) => transport.request(request).await,
            None => Err(ComfyError::NotConnected),
        }
    }

    /// Wait for the next push notification.
    ///
    /// Returns [`ComfyError::ConnectionClosed`] if the session has no open
    /// notification channel.
    pub async fn receive_notification(&mut self) -> Result<Notification> {
        match &mut self.notifications {
            Some(source) => source.next_notification().await,
            None => Err(ComfyError::ConnectionClosed),
        }
    }

    /// Release both channels. Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(mut source) = self.notifications.take() {
            if let Err(e) = source.close().await {
                tracing::debug!(error = %e, "Error closing notification channel");
            }
        }
        if self.transport.take().is_some() {
            tracing::info!(client_id = %self.client_id, "Session closed");
        }
    }
}
