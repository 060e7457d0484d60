//! MCP (Model Context Protocol) client for tooldeck.
//!
//! This crate provides a small asynchronous client for the Model Context
//! Protocol, enough to connect to a server, discover its tools and invoke
//! them while observing progress notifications.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient (implements ToolClient)                          │
//! │  - initialize, tools/list, tools/call                       │
//! │  - routes notifications/progress to the caller              │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpTransport                                               │
//! │  - Stdio: newline-delimited JSON-RPC with a child process   │
//! │  - StreamableHttp: POST, JSON or event-stream responses     │
//! │  - Sse: GET event stream + POST to the announced endpoint   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use tooldeck_mcp::{McpClient, StdioConfig, TransportConfig};
//!
//! let config = TransportConfig::Stdio(
//!     StdioConfig::new("npx").with_args(vec!["-y".into(), "server-x".into()]),
//! );
//!
//! let mut client = McpClient::connect(config).await?;
//! let server_info = client.initialize().await?;
//! println!("Connected to: {} v{}", server_info.name, server_info.version);
//!
//! for tool in client.list_tools().await? {
//!     println!("Tool: {} - {:?}", tool.name, tool.description);
//! }
//!
//! let result = client
//!     .call_tool("echo", json!({"message": "hi"}), &mut |p| println!("{p:?}"))
//!     .await?;
//! println!("Result: {:?}", result.text());
//! ```
//!
//! # Protocol flow
//!
//! 1. Client sends `initialize` with capabilities
//! 2. Server responds with its capabilities
//! 3. Client sends `notifications/initialized`
//! 4. Client can now call `tools/list` and `tools/call`

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export main types
pub use client::{McpClient, ProgressHandler, ToolClient};
pub use config::{
    DEFAULT_CONNECT_TIMEOUT, RemoteConfig, StdioConfig, TransportConfig, TransportKind,
};
pub use error::{McpError, Result};
pub use protocol::{
    CallToolParams, CallToolResult, IncomingMessage, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    ProgressNotification, ServerCapabilities, ServerInfo, ToolContent, ToolInfo,
};
pub use transport::McpTransport;
