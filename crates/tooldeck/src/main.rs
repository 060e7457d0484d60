//! Tooldeck - interactive diagnostic client for MCP tool servers
//!
//! Connects to a server over stdio, legacy SSE or streamable HTTP, lists its
//! tools, shows their schemas and calls them with JSON arguments typed at the
//! prompt.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tooldeck_mcp::{TransportConfig, TransportKind};
use tracing_appender::non_blocking::WorkerGuard;

mod endpoint;
mod input;
mod render;
mod repl;
mod session;

use endpoint::EndpointSpec;
use input::{EditorSource, InputError, LineSource};
use repl::Repl;
use session::Session;

const SAMPLES: &str = "\
sample:
tooldeck -t sse -u http://your.com/sse
tooldeck -t http -u http://your.com/mcp
tooldeck -t stdio -u \"npx -y @modelcontextprotocol/server-sequential-thinking\"
";

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Tooldeck - interactive diagnostic client for MCP tool servers
#[derive(Parser)]
#[command(name = "tooldeck")]
#[command(author, version, about, long_about = None)]
#[command(after_help = SAMPLES)]
pub struct Cli {
    /// sse/streamable: server URL. stdio: command line (see samples)
    #[arg(short, long, env = "TOOLDECK_URL")]
    pub url: Option<String>,

    /// Transport type: stdio, sse or http (streamable HTTP); inferred from the URL when omitted
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub transport: Option<String>,

    /// HTTP header (environment variable for stdio), e.g. "McpSession: abc123"
    #[arg(short = 'H', long = "header", value_name = "KEY: VALUE")]
    pub headers: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Also write a daily-rotated JSON log to this directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.debug, cli.log_dir.as_deref());

    match run(cli).await {
        // Ctrl+C or Ctrl+D end the session quietly.
        Err(e) if matches!(
            e.downcast_ref::<InputError>(),
            Some(InputError::Closed | InputError::Interrupted)
        ) =>
        {
            println!();
            Ok(())
        }
        other => other,
    }
}

/// Console (human-readable, stderr) plus an optional rotating JSON file.
fn init_tracing(debug: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug {
            "tooldeck=debug,tooldeck_mcp=debug,info"
        } else {
            "warn"
        })
    });

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "tooldeck.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("tooldeck=trace,tooldeck_mcp=trace,info"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .with(file_layer)
        .init();

    guard
}

async fn run(cli: Cli) -> Result<()> {
    let kind = endpoint::parse_kind(cli.transport.as_deref().unwrap_or_default())?;
    let mut input = EditorSource::new()?;

    let target = match cli.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => url.to_string(),
        None => {
            Cli::command().print_help()?;
            println!("{}", SAMPLES);
            println!("\ninput url (sse or streamable):");
            input.read_line("")?.trim().to_string()
        }
    };

    if kind != Some(TransportKind::Stdio) && !target.starts_with("http") {
        println!("URL string must start with http");
        return Ok(());
    }

    let headers = endpoint::parse_headers(&cli.headers);
    let spec = EndpointSpec::new(target, kind, headers);
    let config = spec.transport_config();

    if let TransportConfig::Stdio(stdio) = &config {
        println!(
            "\nstarting stdio mcp: {} {:?} (env: {:?})\n",
            stdio.command,
            stdio.args,
            stdio.env.keys().collect::<Vec<_>>()
        );
    }
    tracing::info!(transport = %spec.kind(), target = %config.target(), "connecting");

    // Ctrl+C is also honoured while the handshake or catalog fetch is pending.
    let mut session = tokio::select! {
        session = Session::connect(config) => session?,
        Ok(()) = tokio::signal::ctrl_c() => return Err(InputError::Interrupted.into()),
    };
    session.list_tools();

    let mut repl = Repl::new(input);
    let outcome = tokio::select! {
        result = repl.run(&mut session) => result,
        Ok(()) = tokio::signal::ctrl_c() => Err(InputError::Interrupted),
    };

    session.disconnect().await;
    tracing::debug!(state = ?session.state(), "session closed");

    Ok(outcome?)
}
