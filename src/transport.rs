//! Request/response and push-notification channels to one ComfyUI server.
//!
//! [`Transport`] and [`NotificationSource`] are the seams the job runner
//! talks through; [`HttpTransport`] and [`WsNotifications`] are the
//! network-backed implementations.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{ComfyError, Result};
use crate::notification::{parse_notification, Notification};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Request payload.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Multipart form with one file part plus plain text fields.
    Upload {
        field: String,
        filename: String,
        bytes: Vec<u8>,
        fields: Vec<(String, String)>,
    },
}

/// A request against the server, addressed by path relative to the endpoint.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Json(body),
        }
    }

    pub fn upload(
        path: impl Into<String>,
        field: impl Into<String>,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Upload {
                field: field.into(),
                filename: filename.into(),
                bytes,
                fields: Vec::new(),
            },
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a text field to an upload; ignored for other bodies.
    pub fn form_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let RequestBody::Upload { fields, .. } = &mut self.body {
            fields.push((key.into(), value.into()));
        }
        self
    }
}

/// Raw response: status code plus body bytes.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A 200 response with a JSON body.
    pub fn json_ok(body: &Value) -> Self {
        Self::new(200, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`ComfyError::Http`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ComfyError::Http {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }

    /// Parse the body as JSON, reporting failures as [`ComfyError::Decode`].
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| ComfyError::Decode(e.to_string()))
    }
}

/// Request/response channel to one server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// Push-notification channel to one server, read by a single consumer.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Wait for the next notification. Returns [`ComfyError::ConnectionClosed`]
    /// once the channel has ended.
    async fn next_notification(&mut self) -> Result<Notification>;

    async fn close(&mut self) -> Result<()>;
}

// ── HTTP ────────────────────────────────────────────────────────────

/// [`Transport`] over HTTP using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.endpoint, request.path);
        let builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };
        let mut builder = builder.timeout(self.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Upload {
                field,
                filename,
                bytes,
                fields,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
                let form = fields
                    .into_iter()
                    .fold(reqwest::multipart::Form::new().part(field, part), |form, (k, v)| {
                        form.text(k, v)
                    });
                builder.multipart(form)
            }
        };

        let resp = builder.send().await.map_err(|e| ComfyError::Connection {
            context: format!(
                "Cannot connect to ComfyUI at {} (is the service running?)",
                self.endpoint
            ),
            source: e,
        })?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| ComfyError::Connection {
            context: format!("Failed to read response body from {}", request.path),
            source: e,
        })?;
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}

// ── WebSocket ───────────────────────────────────────────────────────

/// [`NotificationSource`] over ComfyUI's `/ws` endpoint.
pub struct WsNotifications {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WsNotifications {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ComfyError::websocket(format!("Failed to connect to {}", url), e))?;
        Ok(Self { stream })
    }
}

#[async_trait]
impl NotificationSource for WsNotifications {
    async fn next_notification(&mut self) -> Result<Notification> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => match parse_notification(&text) {
                    Ok(notification) => return Ok(notification),
                    Err(e) => {
                        tracing::warn!(error = %e, raw_message = %text, "Failed to parse ComfyUI message");
                    }
                },
                Ok(Message::Binary(_)) => {
                    // Preview images.
                    tracing::trace!("Ignoring binary message");
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "ComfyUI WebSocket closed");
                    return Err(ComfyError::ConnectionClosed);
                }
                Ok(_) => {}
                Err(e) => return Err(ComfyError::websocket("WebSocket receive error", e)),
            }
        }
        Err(ComfyError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ComfyError::websocket("Failed to close WebSocket", e))?;
        Ok(())
    }
}
