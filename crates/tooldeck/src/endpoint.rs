//! Derives a transport configuration from the command line target.

use std::collections::BTreeMap;
use std::time::Duration;

use tooldeck_mcp::{McpError, RemoteConfig, StdioConfig, TransportConfig, TransportKind};

/// Idle read timeout for remote servers; long enough for slow tool calls.
pub const REMOTE_READ_TIMEOUT: Duration = Duration::from_secs(3600);

/// Parse a transport kind from the command line. Empty means "infer".
pub fn parse_kind(raw: &str) -> Result<Option<TransportKind>, McpError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some)
}

/// Parse `key: value` header strings.
///
/// Malformed entries are reported and skipped; later keys win.
pub fn parse_headers(raw: &[String]) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for entry in raw {
        match entry.split_once(':') {
            Some((key, value)) => {
                let key = key.trim().to_string();
                let value = value.trim().to_string();
                println!("Use Header {}:{}", key, value);
                headers.insert(key, value);
            }
            None => {
                println!("Invalid header format: {}", entry);
                tracing::warn!(header = %entry, "skipping header without ':'");
            }
        }
    }
    headers
}

/// Where to connect and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    raw_target: String,
    kind: TransportKind,
    headers: BTreeMap<String, String>,
}

impl EndpointSpec {
    /// Build an endpoint, inferring the transport kind when none is given.
    ///
    /// A target containing `sse` is taken to be a legacy SSE server;
    /// anything else is streamable HTTP. Stdio is never inferred.
    pub fn new(
        raw_target: impl Into<String>,
        kind: Option<TransportKind>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        let raw_target = raw_target.into();
        let kind = kind.unwrap_or_else(|| {
            if raw_target.contains("sse") {
                TransportKind::Sse
            } else {
                TransportKind::StreamableHttp
            }
        });

        Self {
            raw_target,
            kind,
            headers,
        }
    }

    /// The resolved transport kind.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Derive the transport configuration.
    ///
    /// For stdio the target is split on whitespace into a command and its
    /// arguments (no quoting), and the headers become environment variables
    /// of the child. Remote targets are used verbatim as the URL.
    pub fn transport_config(&self) -> TransportConfig {
        match self.kind {
            TransportKind::Stdio => {
                let mut tokens = self.raw_target.split_whitespace().map(str::to_string);
                let command = tokens.next().unwrap_or_default();
                TransportConfig::Stdio(
                    StdioConfig::new(command)
                        .with_args(tokens.collect())
                        .with_env(self.headers.clone()),
                )
            }
            TransportKind::Sse => TransportConfig::Sse(self.remote_config()),
            TransportKind::StreamableHttp => TransportConfig::StreamableHttp(self.remote_config()),
        }
    }

    fn remote_config(&self) -> RemoteConfig {
        RemoteConfig::new(self.raw_target.clone())
            .with_headers(self.headers.clone())
            .with_read_timeout(REMOTE_READ_TIMEOUT)
    }
}
