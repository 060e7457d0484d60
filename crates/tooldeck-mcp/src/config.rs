//! Transport configuration for MCP server connections.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::McpError;

/// Default read timeout for remote transports.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for remote transports.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport kind for MCP server connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Spawn a child process and talk over its stdin/stdout.
    Stdio,
    /// Legacy HTTP+SSE transport (GET event stream, POST to announced endpoint).
    Sse,
    /// Streamable HTTP transport (single endpoint, POST per message).
    StreamableHttp,
}

impl TransportKind {
    /// Name used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
            Self::StreamableHttp => "http",
        }
    }

    /// Check if this kind talks to a remote server over HTTP.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Stdio)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "sse" => Ok(Self::Sse),
            "http" => Ok(Self::StreamableHttp),
            other => Err(McpError::invalid_config(format!(
                "unknown transport type '{}' (expected stdio, sse or http)",
                other
            ))),
        }
    }
}

/// Configuration for a stdio server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioConfig {
    /// Command to spawn.
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Environment variables added to the child's environment.
    pub env: BTreeMap<String, String>,
}

impl StdioConfig {
    /// Create a new stdio config for the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Set the arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the environment additions.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Configuration for a remote (HTTP based) server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// URL of the MCP endpoint.
    pub url: String,
    /// HTTP headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Idle read timeout.
    pub read_timeout: Duration,
}

impl RemoteConfig {
    /// Create a new remote config with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set the headers.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the idle read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Transport-specific configuration for one MCP server connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Local child process.
    Stdio(StdioConfig),
    /// Legacy HTTP+SSE server.
    Sse(RemoteConfig),
    /// Streamable HTTP server.
    StreamableHttp(RemoteConfig),
}

impl TransportConfig {
    /// The transport kind this config is for.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::Sse(_) => TransportKind::Sse,
            Self::StreamableHttp(_) => TransportKind::StreamableHttp,
        }
    }

    /// Short description of the target, for logs.
    pub fn target(&self) -> String {
        match self {
            Self::Stdio(cfg) if cfg.args.is_empty() => cfg.command.clone(),
            Self::Stdio(cfg) => format!("{} {}", cfg.command, cfg.args.join(" ")),
            Self::Sse(cfg) | Self::StreamableHttp(cfg) => cfg.url.clone(),
        }
    }
}
