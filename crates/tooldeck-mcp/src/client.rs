//! MCP client for communicating with MCP servers.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{TransportConfig, TransportKind};
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, ListToolsResult, PROGRESS_NOTIFICATION, ProgressNotification, ServerInfo,
    ToolInfo,
};
use crate::transport::{McpTransport, NotificationHandler};

/// Receives progress notifications for an outstanding tool call.
pub type ProgressHandler<'a> = dyn FnMut(&ProgressNotification) + Send + 'a;

/// The capabilities an interactive session needs from a connected server.
#[async_trait]
pub trait ToolClient: Send {
    /// Fetch the complete tool catalog.
    async fn list_tools(&mut self) -> Result<Vec<ToolInfo>>;

    /// Invoke a tool, reporting progress as it arrives.
    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
        on_progress: &mut ProgressHandler<'_>,
    ) -> Result<CallToolResult>;

    /// Release the connection.
    async fn disconnect(&mut self) -> Result<()>;
}

/// An MCP client connected to a single MCP server.
pub struct McpClient {
    /// Transport configuration.
    config: TransportConfig,
    /// Transport for communicating with the server.
    transport: McpTransport,
    /// Server info (after initialization).
    server_info: Option<ServerInfo>,
    /// Counter for generating unique request IDs.
    request_id: AtomicU64,
    /// Whether the client has been initialized.
    initialized: bool,
}

impl McpClient {
    /// Connect to an MCP server using the configured transport.
    ///
    /// This does NOT initialize the connection - call `initialize()` after connecting.
    pub async fn connect(config: TransportConfig) -> Result<Self> {
        let transport = McpTransport::connect(&config).await?;

        tracing::info!(
            transport = %config.kind(),
            target = %config.target(),
            "connected to MCP server"
        );

        Ok(Self {
            config,
            transport,
            server_info: None,
            request_id: AtomicU64::new(1),
            initialized: false,
        })
    }

    /// Get the transport kind.
    pub fn kind(&self) -> TransportKind {
        self.config.kind()
    }

    /// Get the server info (after initialization).
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Check if the client has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Get the next request ID.
    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a prepared request and get the result.
    async fn exchange(
        &mut self,
        request: JsonRpcRequest,
        on_notification: &mut NotificationHandler<'_>,
    ) -> Result<Value> {
        let response = self
            .transport
            .send_request(&request, on_notification)
            .await?;

        response
            .into_result()
            .map_err(|e| McpError::server_error(e.code, e.message, e.data))
    }

    /// Send a request and get the result, logging any notifications.
    async fn send_request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let request = JsonRpcRequest::new(self.next_request_id(), method, params);
        self.exchange(request, &mut log_notification).await
    }

    /// Send a notification (no response expected).
    async fn send_notification(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        self.transport.send_notification(&notification).await
    }

    /// Initialize the connection with the MCP server.
    ///
    /// This performs the MCP handshake, exchanging capabilities and protocol versions.
    /// Must be called before using other methods.
    pub async fn initialize(&mut self) -> Result<&ServerInfo> {
        if !self.initialized {
            let params = InitializeParams::default();
            let result = self
                .send_request("initialize", Some(serde_json::to_value(&params)?))
                .await?;

            let init_result: InitializeResult = serde_json::from_value(result)?;

            tracing::info!(
                server = %init_result.server_info.name,
                version = %init_result.server_info.version,
                protocol = %init_result.protocol_version,
                "MCP server initialized"
            );

            self.send_notification("notifications/initialized", None)
                .await?;

            self.server_info = Some(init_result.server_info);
            self.initialized = true;
        }

        self.server_info.as_ref().ok_or(McpError::NotInitialized)
    }

    /// List all tools from the server, following pagination cursors.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolInfo>> {
        if !self.initialized {
            return Err(McpError::NotInitialized);
        }

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor
                .take()
                .map(|c| serde_json::json!({ "cursor": c }));
            let result = self.send_request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(result)?;

            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(tool_count = tools.len(), "listed MCP tools");

        Ok(tools)
    }

    /// Call a tool on the server.
    ///
    /// The request carries a progress token; matching `notifications/progress`
    /// messages are passed to `on_progress` as they arrive.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
        on_progress: &mut ProgressHandler<'_>,
    ) -> Result<CallToolResult> {
        if !self.initialized {
            return Err(McpError::NotInitialized);
        }

        let id = self.next_request_id();
        let token = Value::from(id);

        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
            meta: None,
        }
        .with_progress_token(token.clone());

        let request = JsonRpcRequest::new(id, "tools/call", Some(serde_json::to_value(&params)?));

        let mut on_notification = |notification: JsonRpcNotification| {
            if notification.method != PROGRESS_NOTIFICATION {
                log_notification(notification);
                return;
            }
            match notification
                .params
                .map(serde_json::from_value::<ProgressNotification>)
            {
                Some(Ok(progress)) if progress.progress_token == token => on_progress(&progress),
                Some(Ok(progress)) => tracing::debug!(
                    token = %progress.progress_token,
                    "ignoring progress for another request"
                ),
                _ => tracing::debug!("ignoring malformed progress notification"),
            }
        };

        let result = self.exchange(request, &mut on_notification).await?;
        let call_result: CallToolResult = serde_json::from_value(result)?;

        if call_result.is_error() {
            tracing::warn!(tool = %name, "tool call returned error");
        } else {
            tracing::debug!(tool = %name, "tool call succeeded");
        }

        Ok(call_result)
    }

    /// Shutdown the connection gracefully.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!(target = %self.config.target(), "shutting down MCP client");
        self.initialized = false;
        self.transport.shutdown().await
    }

    /// Check if the connection is still active.
    pub fn is_connected(&mut self) -> bool {
        self.transport.is_connected()
    }
}

#[async_trait]
impl ToolClient for McpClient {
    async fn list_tools(&mut self) -> Result<Vec<ToolInfo>> {
        McpClient::list_tools(self).await
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
        on_progress: &mut ProgressHandler<'_>,
    ) -> Result<CallToolResult> {
        McpClient::call_tool(self, name, arguments, on_progress).await
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.shutdown().await
    }
}

fn log_notification(notification: JsonRpcNotification) {
    match notification.method.as_str() {
        "notifications/message" => tracing::debug!(
            params = ?notification.params,
            "server log message"
        ),
        method => tracing::trace!(method = %method, "unhandled server notification"),
    }
}
