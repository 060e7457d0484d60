//! The interactive command loop.

use tooldeck_mcp::ToolClient;

use crate::input::{InputError, LineSource, read_json_object};
use crate::render::print_error;
use crate::session::Session;

/// Prompt shown while waiting for a command.
pub const COMMAND_PROMPT: &str = "enter a tool index, or list/dump/quit > ";

/// A classified command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    List,
    Dump,
    Quit,
    /// 1-based tool index.
    Index(usize),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => Self::Empty,
            "list" => Self::List,
            "dump" => Self::Dump,
            "quit" => Self::Quit,
            // Too large to fit is past the end of any catalog.
            digits if digits.bytes().all(|b| b.is_ascii_digit()) => {
                Self::Index(digits.parse().unwrap_or(usize::MAX))
            }
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Control flow for the REPL.
pub enum ControlFlow {
    Continue,
    Exit,
}

/// Reads commands and dispatches them to the session.
pub struct Repl<S: LineSource> {
    input: S,
}

impl<S: LineSource> Repl<S> {
    pub fn new(input: S) -> Self {
        Self { input }
    }

    /// Run until `quit` or until input ends.
    ///
    /// A closed or interrupted input is returned to the caller.
    pub async fn run<C: ToolClient>(&mut self, session: &mut Session<C>) -> Result<(), InputError> {
        loop {
            let line = self.input.read_line(COMMAND_PROMPT)?;
            match self.dispatch(session, Command::parse(&line)).await? {
                ControlFlow::Continue => {}
                ControlFlow::Exit => return Ok(()),
            }
        }
    }

    async fn dispatch<C: ToolClient>(
        &mut self,
        session: &mut Session<C>,
        command: Command,
    ) -> Result<ControlFlow, InputError> {
        tracing::trace!(command = ?command, "dispatching command");

        match command {
            Command::Empty => {}
            Command::List => session.list_tools(),
            Command::Dump => {
                if let Err(e) = session.dump_all_schemas() {
                    print_error(&e.to_string());
                }
            }
            Command::Quit => return Ok(ControlFlow::Exit),
            Command::Index(index) => match session.show_tool_schema(index) {
                Some(name) => {
                    let prompt = format!(
                        "\ninput call tool {} json args (support multiple lines json) :\n",
                        name
                    );
                    let arguments = read_json_object(&mut self.input, &prompt)?;
                    session.call_tool(&name, Some(arguments)).await;
                }
                None => {
                    tracing::debug!(index, tools = session.catalog().len(), "tool index out of range");
                }
            },
            Command::Unknown(line) => {
                tracing::debug!(line = %line, "unknown command");
                println!("Unknown command");
            }
        }

        Ok(ControlFlow::Continue)
    }
}
