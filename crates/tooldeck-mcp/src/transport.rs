//! Transport layer for MCP communication.
//!
//! Local servers are spawned as child processes and speak newline-delimited
//! JSON-RPC over stdio. Remote servers are reached either through the
//! streamable HTTP transport (one endpoint, POST per message, JSON or
//! event-stream responses) or the legacy HTTP+SSE transport (a long-lived
//! GET event stream plus POSTs to the endpoint it announces).
//!
//! Every transport is driven by the caller: `send_request` writes the request
//! and then reads server messages until the matching response arrives.
//! Notifications seen on the way are handed to the caller; requests initiated
//! by the server are answered immediately.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use url::Url;

use crate::config::{
    DEFAULT_CONNECT_TIMEOUT, RemoteConfig, StdioConfig, TransportConfig, TransportKind,
};
use crate::error::{McpError, Result};
use crate::protocol::{IncomingMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Session header used by the streamable HTTP transport.
const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Accept header for POSTs on the streamable HTTP transport.
const STREAMABLE_ACCEPT: &str = "application/json, text/event-stream";

/// How long a stdio server gets to exit after its stdin is closed.
const GRACEFUL_EXIT: Duration = Duration::from_secs(2);

/// Receives notifications that arrive while a request is outstanding.
pub type NotificationHandler<'a> = dyn FnMut(JsonRpcNotification) + Send + 'a;

type EventStream =
    Pin<Box<dyn Stream<Item = std::result::Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

/// Transport for communicating with an MCP server.
pub enum McpTransport {
    /// Child process over stdin/stdout.
    Stdio(StdioTransport),
    /// Streamable HTTP.
    StreamableHttp(StreamableHttpTransport),
    /// Legacy HTTP+SSE.
    Sse(SseTransport),
}

impl McpTransport {
    /// Open a transport for the given configuration.
    ///
    /// For stdio this spawns the server; for SSE it opens the event stream
    /// and waits for the endpoint announcement. Streamable HTTP performs no
    /// I/O until the first message is sent.
    pub async fn connect(config: &TransportConfig) -> Result<Self> {
        match config {
            TransportConfig::Stdio(cfg) => Ok(Self::Stdio(StdioTransport::spawn(cfg)?)),
            TransportConfig::StreamableHttp(cfg) => {
                Ok(Self::StreamableHttp(StreamableHttpTransport::new(cfg)?))
            }
            TransportConfig::Sse(cfg) => Ok(Self::Sse(SseTransport::connect(cfg).await?)),
        }
    }

    /// Send a JSON-RPC request and wait for its response.
    pub async fn send_request(
        &mut self,
        request: &JsonRpcRequest,
        on_notification: &mut NotificationHandler<'_>,
    ) -> Result<JsonRpcResponse> {
        tracing::trace!(id = %request.id, method = %request.method, "sending MCP request");
        match self {
            Self::Stdio(t) => t.request(request, on_notification).await,
            Self::StreamableHttp(t) => t.request(request, on_notification).await,
            Self::Sse(t) => t.request(request, on_notification).await,
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn send_notification(&mut self, notification: &JsonRpcNotification) -> Result<()> {
        tracing::trace!(method = %notification.method, "sending MCP notification");
        match self {
            Self::Stdio(t) => t.write_message(notification).await,
            Self::StreamableHttp(t) => t.notify(notification).await,
            Self::Sse(t) => t.post(notification).await,
        }
    }

    /// Shutdown the transport gracefully.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Self::Stdio(t) => t.shutdown().await,
            Self::StreamableHttp(t) => {
                t.shutdown().await;
                Ok(())
            }
            // Dropping the event stream closes the connection.
            Self::Sse(_) => Ok(()),
        }
    }

    /// Check if the transport is still connected.
    pub fn is_connected(&mut self) -> bool {
        match self {
            Self::Stdio(t) => t.is_running(),
            Self::StreamableHttp(_) | Self::Sse(_) => true,
        }
    }

    /// The kind of this transport.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::StreamableHttp(_) => TransportKind::StreamableHttp,
            Self::Sse(_) => TransportKind::Sse,
        }
    }
}

/// What to do with a message received while waiting for a response.
enum Routed {
    /// The response we were waiting for.
    Done(JsonRpcResponse),
    /// A reply that must be sent back to the server.
    Reply(JsonRpcResponse),
    /// Keep waiting.
    Pending,
}

fn route(
    message: IncomingMessage,
    id: &Value,
    on_notification: &mut NotificationHandler<'_>,
) -> Routed {
    match message {
        IncomingMessage::Response(response) if &response.id == id => Routed::Done(response),
        IncomingMessage::Response(response) => {
            tracing::debug!(id = %response.id, "ignoring response to an unknown request");
            Routed::Pending
        }
        IncomingMessage::Notification(notification) => {
            on_notification(notification);
            Routed::Pending
        }
        IncomingMessage::Request(request) => {
            tracing::debug!(method = %request.method, "answering server request");
            Routed::Reply(request.default_reply())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stdio
// ─────────────────────────────────────────────────────────────────────────────

/// Stdio transport - communicates with a child process via stdin/stdout.
pub struct StdioTransport {
    /// The child process.
    child: Child,
    /// Writer to stdin; `None` once closed.
    stdin: Option<ChildStdin>,
    /// Line reader over stdout.
    stdout: Lines<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Spawn the server process.
    pub fn spawn(config: &StdioConfig) -> Result<Self> {
        if config.command.trim().is_empty() {
            return Err(McpError::invalid_config("stdio transport requires a command"));
        }

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let stderr pass through for debugging
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            McpError::spawn_failed(format!("failed to spawn '{}': {}", config.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;

        tracing::info!(
            command = %config.command,
            args = ?config.args,
            env_vars = config.env.len(),
            "spawned MCP server"
        );

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// Write one message as a single line.
    async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(McpError::ConnectionClosed)?;

        let mut json = serde_json::to_string(message)?;
        tracing::trace!(json = %json, "sent MCP message");
        json.push('\n');

        stdin.write_all(json.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read the next JSON-RPC message, skipping blank and non-JSON lines.
    async fn read_message(&mut self) -> Result<IncomingMessage> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or(McpError::ConnectionClosed)?;
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(line) {
                Ok(value) => {
                    tracing::trace!(json = %line, "received MCP message");
                    return IncomingMessage::from_value(value);
                }
                Err(e) => {
                    tracing::debug!(line = %line, error = %e, "skipping non-JSON output from server");
                }
            }
        }
    }

    async fn request(
        &mut self,
        request: &JsonRpcRequest,
        on_notification: &mut NotificationHandler<'_>,
    ) -> Result<JsonRpcResponse> {
        self.write_message(request).await?;

        loop {
            let message = self.read_message().await?;
            match route(message, &request.id, &mut *on_notification) {
                Routed::Done(response) => return Ok(response),
                Routed::Reply(reply) => self.write_message(&reply).await?,
                Routed::Pending => {}
            }
        }
    }

    /// Close stdin, give the server a moment to exit, then kill it.
    async fn shutdown(&mut self) -> Result<()> {
        drop(self.stdin.take());

        match tokio::time::timeout(GRACEFUL_EXIT, self.child.wait()).await {
            Ok(status) => {
                tracing::debug!(status = ?status, "MCP server exited");
            }
            Err(_) => {
                tracing::debug!("MCP server still running, killing it");
                self.child.kill().await?;
            }
        }
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP helpers
// ─────────────────────────────────────────────────────────────────────────────

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| McpError::transport(format!("invalid URL: {}", e)))
}

fn build_http_client(config: &RemoteConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .read_timeout(config.read_timeout)
        .pool_max_idle_per_host(5)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .map_err(|e| McpError::transport(format!("failed to build HTTP client: {}", e)))
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| McpError::invalid_config(format!("invalid header name '{}': {}", key, e)))?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            McpError::invalid_config(format!("invalid value for header '{}': {}", key, e))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(McpError::transport(format!("HTTP error {}: {}", status, body)))
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"))
}

/// Decode the JSON-RPC messages carried by one SSE event.
fn decode_event(event: &Event) -> Result<Vec<IncomingMessage>> {
    if !event.event.is_empty() && event.event != "message" {
        tracing::debug!(event = %event.event, "ignoring SSE event");
        return Ok(Vec::new());
    }
    if event.data.trim().is_empty() {
        return Ok(Vec::new());
    }
    IncomingMessage::from_value_batch(serde_json::from_str(&event.data)?)
}

fn stream_error(err: EventStreamError<reqwest::Error>) -> McpError {
    McpError::transport(format!("event stream error: {}", err))
}

/// Resolve the message endpoint announced by an SSE server.
///
/// The event data is either a (possibly relative) URI or `{"uri": "..."}`.
fn resolve_endpoint(base: &Url, data: &str) -> Result<Url> {
    let data = data.trim();
    let uri = if data.starts_with('{') {
        let value: Value = serde_json::from_str(data)?;
        value
            .get("uri")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| McpError::protocol("endpoint event is missing 'uri'"))?
    } else {
        data.to_string()
    };

    base.join(&uri)
        .map_err(|e| McpError::protocol(format!("invalid endpoint '{}': {}", uri, e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Streamable HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Streamable HTTP transport.
pub struct StreamableHttpTransport {
    /// HTTP client (shared for connection pooling).
    client: reqwest::Client,
    /// MCP endpoint.
    url: Url,
    /// User supplied headers.
    headers: HeaderMap,
    /// Session id assigned by the server.
    session_id: Option<String>,
}

impl StreamableHttpTransport {
    /// Create a new streamable HTTP transport.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let url = parse_url(&config.url)?;
        let headers = header_map(&config.headers)?;
        let client = build_http_client(config)?;

        tracing::info!(
            url = %url,
            read_timeout_secs = config.read_timeout.as_secs(),
            "created streamable HTTP transport"
        );

        Ok(Self {
            client,
            url,
            headers,
            session_id: None,
        })
    }

    /// Session id assigned by the server, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn post<T: Serialize>(&mut self, message: &T) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .header(ACCEPT, STREAMABLE_ACCEPT)
            .json(message);

        if let Some(session_id) = &self.session_id {
            req = req.header(SESSION_ID_HEADER, session_id);
        }

        let response = req
            .send()
            .await
            .map_err(|e| McpError::transport(format!("HTTP request failed: {}", e)))?;
        let response = ensure_success(response).await?;

        if let Some(session_id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            && self.session_id.as_deref() != Some(session_id)
        {
            tracing::debug!(session_id = %session_id, "received MCP session id");
            self.session_id = Some(session_id.to_string());
        }

        Ok(response)
    }

    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<()> {
        self.post(notification).await?;
        Ok(())
    }

    async fn request(
        &mut self,
        request: &JsonRpcRequest,
        on_notification: &mut NotificationHandler<'_>,
    ) -> Result<JsonRpcResponse> {
        let response = self.post(request).await?;

        if response.status() == StatusCode::ACCEPTED {
            return Err(McpError::protocol(format!(
                "server accepted request {} without responding",
                request.id
            )));
        }

        if is_event_stream(&response) {
            let mut events: EventStream = Box::pin(response.bytes_stream().eventsource());
            while let Some(event) = events.next().await {
                let event = event.map_err(stream_error)?;
                for message in decode_event(&event)? {
                    match route(message, &request.id, &mut *on_notification) {
                        Routed::Done(response) => return Ok(response),
                        Routed::Reply(reply) => {
                            self.post(&reply).await?;
                        }
                        Routed::Pending => {}
                    }
                }
            }
        } else {
            let body = response.text().await?;
            tracing::trace!(json = %body, "received MCP HTTP response");
            let mut found = None;
            for message in IncomingMessage::from_value_batch(serde_json::from_str(&body)?)? {
                match route(message, &request.id, &mut *on_notification) {
                    Routed::Done(response) => found = Some(response),
                    Routed::Reply(reply) => {
                        self.post(&reply).await?;
                    }
                    Routed::Pending => {}
                }
            }
            if let Some(response) = found {
                return Ok(response);
            }
        }

        Err(McpError::protocol(format!(
            "no response to request {}",
            request.id
        )))
    }

    /// End the server-side session, if one was established.
    async fn shutdown(&mut self) {
        let Some(session_id) = self.session_id.take() else {
            return;
        };

        let result = self
            .client
            .delete(self.url.clone())
            .headers(self.headers.clone())
            .header(SESSION_ID_HEADER, &session_id)
            .send()
            .await;

        match result {
            Ok(resp) => tracing::debug!(status = %resp.status(), "closed MCP session"),
            Err(e) => tracing::debug!(error = %e, "failed to close MCP session"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Legacy HTTP+SSE
// ─────────────────────────────────────────────────────────────────────────────

/// Legacy HTTP+SSE transport.
pub struct SseTransport {
    /// HTTP client (shared for connection pooling).
    client: reqwest::Client,
    /// User supplied headers.
    headers: HeaderMap,
    /// Where messages are POSTed, as announced by the server.
    endpoint: Url,
    /// The server-to-client event stream.
    events: EventStream,
}

impl SseTransport {
    /// Open the event stream and wait for the endpoint announcement.
    pub async fn connect(config: &RemoteConfig) -> Result<Self> {
        let url = parse_url(&config.url)?;
        let headers = header_map(&config.headers)?;
        let client = build_http_client(config)?;

        let response = client
            .get(url.clone())
            .headers(headers.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| McpError::transport(format!("failed to open event stream: {}", e)))?;
        let response = ensure_success(response).await?;

        let mut events: EventStream = Box::pin(response.bytes_stream().eventsource());

        let endpoint = loop {
            let event = events
                .next()
                .await
                .ok_or_else(|| McpError::protocol("event stream ended before the endpoint event"))?
                .map_err(stream_error)?;

            if event.event == "endpoint" {
                break resolve_endpoint(&url, &event.data)?;
            }
            tracing::debug!(event = %event.event, "ignoring event before endpoint");
        };

        tracing::info!(url = %url, endpoint = %endpoint, "connected SSE transport");

        Ok(Self {
            client,
            headers,
            endpoint,
            events,
        })
    }

    /// The endpoint messages are POSTed to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| McpError::transport(format!("HTTP request failed: {}", e)))?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn request(
        &mut self,
        request: &JsonRpcRequest,
        on_notification: &mut NotificationHandler<'_>,
    ) -> Result<JsonRpcResponse> {
        self.post(request).await?;

        loop {
            let event = self
                .events
                .next()
                .await
                .ok_or(McpError::ConnectionClosed)?
                .map_err(stream_error)?;

            for message in decode_event(&event)? {
                match route(message, &request.id, &mut *on_notification) {
                    Routed::Done(response) => return Ok(response),
                    Routed::Reply(reply) => self.post(&reply).await?,
                    Routed::Pending => {}
                }
            }
        }
    }
}
