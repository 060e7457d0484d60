//! A connected MCP session and the operations the command loop drives.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tooldeck_mcp::{
    CallToolResult, McpClient, McpError, ProgressNotification, ToolClient, ToolInfo,
    TransportConfig,
};

use crate::render::{
    print_dim, print_error, pretty_json, render_catalog, render_progress, render_result,
};

/// File written by `dump`, relative to the working directory.
pub const SCHEMA_DUMP_FILE: &str = "schema.json";

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server could not be reached or refused the handshake.
    #[error("failed to connect to MCP server: {0}")]
    Connection(#[source] McpError),

    /// The schema dump could not be written.
    #[error("failed to write {path}: {source}")]
    Dump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Owns the client and the tool catalog captured at connect time.
///
/// Tool indices shown to the user are positions in that catalog, so it is
/// never refreshed while the session lives.
pub struct Session<C: ToolClient> {
    client: C,
    catalog: Vec<ToolInfo>,
    state: ConnectionState,
}

impl Session<McpClient> {
    /// Connect, run the MCP handshake and fetch the catalog.
    pub async fn connect(config: TransportConfig) -> Result<Self, SessionError> {
        let mut client = McpClient::connect(config)
            .await
            .map_err(SessionError::Connection)?;

        let server = client.initialize().await.map_err(SessionError::Connection)?;
        tracing::info!(server = %server.name, version = %server.version, "session established");

        Self::with_client(client).await
    }
}

impl<C: ToolClient> Session<C> {
    /// Start a session over an already initialized client.
    pub async fn with_client(mut client: C) -> Result<Self, SessionError> {
        let catalog = client.list_tools().await.map_err(SessionError::Connection)?;
        tracing::debug!(tools = catalog.len(), "fetched tool catalog");

        Ok(Self {
            client,
            catalog,
            state: ConnectionState::Connected,
        })
    }

    pub fn catalog(&self) -> &[ToolInfo] {
        &self.catalog
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Print the index/name table.
    pub fn list_tools(&self) {
        println!("{}", render_catalog(&self.catalog));
    }

    /// Print the full document of the tool at a 1-based `index`.
    ///
    /// Returns the tool name, or `None` when the index is out of range.
    pub fn show_tool_schema(&self, index: usize) -> Option<String> {
        let tool = self.catalog.get(index.checked_sub(1)?)?;
        println!("{}", pretty_json(tool));
        Some(tool.name.clone())
    }

    /// Write every tool document to [`SCHEMA_DUMP_FILE`].
    pub fn dump_all_schemas(&self) -> Result<(), SessionError> {
        self.dump_all_schemas_to(Path::new(SCHEMA_DUMP_FILE))
    }

    /// Write every tool document to `path` as a JSON array, replacing the file.
    pub fn dump_all_schemas_to(&self, path: &Path) -> Result<(), SessionError> {
        std::fs::write(path, pretty_json(&self.catalog)).map_err(|source| SessionError::Dump {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), tools = self.catalog.len(), "dumped tool schemas");
        println!("{} saved", path.display());
        Ok(())
    }

    /// Call a tool, printing progress as it arrives and then the result.
    ///
    /// Failures are reported and absorbed; the session stays usable.
    pub async fn call_tool(&mut self, name: &str, arguments: Option<Value>) -> Option<CallToolResult> {
        self.call_tool_with_progress(name, arguments, &mut |line: &str| println!("{}", line))
            .await
    }

    /// Like [`Session::call_tool`], handing each rendered progress line to `report`.
    pub async fn call_tool_with_progress(
        &mut self,
        name: &str,
        arguments: Option<Value>,
        report: &mut (dyn FnMut(&str) + Send),
    ) -> Option<CallToolResult> {
        println!("call tool {} ...", name);

        let arguments = match arguments {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(args) => args,
        };

        let mut on_progress = |progress: &ProgressNotification| {
            report(&render_progress(progress));
        };

        match self.client.call_tool(name, arguments, &mut on_progress).await {
            Ok(result) => {
                println!();
                print_dim("================ tool result ===============");
                println!();
                println!("{}", render_result(&result));
                Some(result)
            }
            Err(e) => {
                tracing::debug!(tool = %name, error = %e, "tool call failed");
                print_error(&format!("Failed to call tool '{}': {}", name, e));
                None
            }
        }
    }

    /// Release the connection. Later calls are no-ops.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;

        if let Err(e) = self.client.disconnect().await {
            tracing::warn!(error = %e, "error while disconnecting");
        }
    }
}
