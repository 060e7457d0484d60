//! Human-readable output for tool results, progress and the catalog.

use console::Style;
use serde_json::Value;
use tooldeck_mcp::{CallToolResult, ProgressNotification, ToolContent, ToolInfo};

const RULE: &str = "==================================";

/// Pretty JSON with 2-space indentation; non-ASCII is kept as is.
pub fn pretty_json(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unprintable: {}>", e))
}

/// Render a tool result, one segment per block.
///
/// Text that happens to be JSON is pretty-printed; other text is shown
/// verbatim. A result without any content is shown whole.
pub fn render_result(result: &CallToolResult) -> String {
    let mut blocks = Vec::new();

    if result.is_error() {
        blocks.push("tool reported an error".to_string());
    }

    match &result.content {
        Some(content) => blocks.extend(content.iter().map(render_content)),
        None => blocks.push(pretty_json(result)),
    }

    blocks.join("\n")
}

fn render_content(content: &ToolContent) -> String {
    match content {
        ToolContent::Text { text } => match serde_json::from_str::<Value>(text) {
            Ok(value) => pretty_json(&value),
            Err(_) => text.clone(),
        },
        ToolContent::Other(raw) => render_other(content.kind(), raw),
    }
}

fn render_other(kind: &str, raw: &Value) -> String {
    match kind {
        "image" | "audio" => {
            let mime = raw
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let size = raw.get("data").and_then(Value::as_str).map_or(0, str::len);
            format!("[{} content: {}, {} bytes base64]", kind, mime, size)
        }
        _ => raw.to_string(),
    }
}

/// One progress line: `[PROGRESS] progress/total message`.
pub fn render_progress(progress: &ProgressNotification) -> String {
    let total = progress
        .total
        .map_or_else(|| "None".to_string(), |t| t.to_string());
    let message = progress.message.as_deref().unwrap_or("None");
    format!("[PROGRESS] {}/{} {}", progress.progress, total, message)
}

/// The index/name table shown after connecting and on `list`.
pub fn render_catalog(tools: &[ToolInfo]) -> String {
    let mut lines = vec![RULE.to_string(), "index | tool name".to_string()];
    lines.extend(
        tools
            .iter()
            .enumerate()
            .map(|(i, tool)| format!(" {:<4} | {}", i + 1, tool.name)),
    );
    lines.push(RULE.to_string());
    lines.join("\n")
}

pub fn print_dim(msg: &str) {
    let dim = Style::new().dim();
    println!("{}", dim.apply_to(msg));
}

pub fn print_error(msg: &str) {
    let red = Style::new().red();
    println!("{}", red.apply_to(msg));
}
