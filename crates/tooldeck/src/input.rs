//! Interactive line input and multi-line JSON entry.

use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::Value;
use thiserror::Error;

/// Errors that end interactive input.
#[derive(Debug, Error)]
pub enum InputError {
    /// End of input (Ctrl+D or closed stdin).
    #[error("input closed")]
    Closed,

    /// Interrupted by the user (Ctrl+C).
    #[error("interrupted")]
    Interrupted,

    /// The terminal could not be read.
    #[error("readline error: {0}")]
    Readline(String),
}

impl From<ReadlineError> for InputError {
    fn from(err: ReadlineError) -> Self {
        match err {
            ReadlineError::Eof => Self::Closed,
            ReadlineError::Interrupted => Self::Interrupted,
            other => Self::Readline(other.to_string()),
        }
    }
}

/// A source of interactive lines.
pub trait LineSource {
    /// Show `prompt` and read one line, without its terminator.
    fn read_line(&mut self, prompt: &str) -> Result<String, InputError>;
}

/// Line source backed by a rustyline editor with in-memory history.
pub struct EditorSource {
    editor: Editor<(), DefaultHistory>,
}

impl EditorSource {
    /// Create an editor for the current terminal.
    pub fn new() -> Result<Self, InputError> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        let editor = Editor::with_config(config)?;
        Ok(Self { editor })
    }
}

impl LineSource for EditorSource {
    fn read_line(&mut self, prompt: &str) -> Result<String, InputError> {
        Ok(self.editor.readline(prompt)?)
    }
}

/// Read one JSON value that may span several lines.
///
/// Lines are trimmed and appended to a buffer until it parses. A buffer that
/// does not start with `{` can never become an object, so it is rejected at
/// once and entry starts over with `prompt`.
pub fn read_json_object(source: &mut impl LineSource, prompt: &str) -> Result<Value, InputError> {
    let mut buffer = String::new();

    loop {
        let line = source.read_line(if buffer.is_empty() { prompt } else { "" })?;
        buffer.push_str(line.trim());
        buffer = buffer.trim().to_string();

        if !buffer.starts_with('{') {
            println!("invalid json format");
            buffer.clear();
            continue;
        }

        match serde_json::from_str(&buffer) {
            Ok(value) => return Ok(value),
            Err(e) => tracing::trace!(error = %e, bytes = buffer.len(), "json input incomplete"),
        }
    }
}
