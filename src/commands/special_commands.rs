//! Special commands parser for interactive chat mode
//!
//! This module parses the slash commands that can be entered during an
//! interactive chat session. Special commands allow users to:
//! - Stop, regenerate or edit AI answers
//! - Reload history or switch to another session
//! - View the transcript and connection status
//! - Display help information
//! - Exit the session
//!
//! Commands are prefixed with `/` and the command word is case-insensitive.
//! Message ids are validated here, so a placeholder or otherwise non-numeric
//! id never reaches the server.

use crate::chat::protocol::parse_server_id;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },

    /// The id is not a server-assigned message id
    #[error("Invalid message id for {command}: {id} (server ids are numeric; wait for the reply to finish)")]
    InvalidMessageId { command: String, id: String },

    /// The history limit is not a positive number
    #[error("Invalid history limit: {0}\n\nUsage: /history [limit]")]
    InvalidLimit(String),
}

/// Special commands that can be executed during interactive chat
///
/// These commands act on the session rather than being sent to the AI as
/// a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Cancel the in-flight generation
    Stop,

    /// Regenerate an answer; `None` lets the server pick the latest one
    Regenerate(Option<u64>),

    /// Replace a message's text and regenerate from there
    Edit {
        /// Server id of the message to edit
        message_id: u64,
        /// Replacement text
        content: String,
    },

    /// Reload history, optionally with an explicit limit
    History(Option<u32>),

    /// Switch to another session
    Session(String),

    /// Print the current transcript with message ids
    Messages,

    /// Display connection and session status
    ShowStatus,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; send the input as a message
    None,
}

/// Parse user input into a special command
///
/// # Arguments
///
/// * `input` - The user input string
///
/// # Returns
///
/// Returns `Ok(SpecialCommand)` if the input is a valid special command or
/// regular input (`SpecialCommand::None`). Returns `Err(CommandError)` if
/// the input looks like a command but is unknown or malformed.
///
/// # Examples
///
/// ```
/// use stockchat::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/stop").unwrap(), SpecialCommand::Stop);
/// assert_eq!(
///     parse_special_command("/regen 42").unwrap(),
///     SpecialCommand::Regenerate(Some(42))
/// );
/// assert_eq!(
///     parse_special_command("What about TSLA?").unwrap(),
///     SpecialCommand::None
/// );
/// assert!(parse_special_command("/edit ai-1000 hi").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    // If input doesn't start with "/", it's not a command (except exit/quit)
    if !trimmed.starts_with('/') {
        return Ok(match lower.as_str() {
            "exit" | "quit" => SpecialCommand::Exit,
            _ => SpecialCommand::None,
        });
    }

    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match word.as_str() {
        "/stop" | "/cancel" => Ok(SpecialCommand::Stop),

        "/regen" | "/regenerate" => {
            if rest.is_empty() {
                Ok(SpecialCommand::Regenerate(None))
            } else {
                parse_id("/regen", rest).map(|id| SpecialCommand::Regenerate(Some(id)))
            }
        }

        "/edit" => {
            let usage = || CommandError::MissingArgument {
                command: "/edit".to_string(),
                usage: "/edit <message_id> <new text>".to_string(),
            };
            let (id, content) = rest.split_once(char::is_whitespace).ok_or_else(usage)?;
            let content = content.trim();
            if content.is_empty() {
                return Err(usage());
            }
            Ok(SpecialCommand::Edit {
                message_id: parse_id("/edit", id)?,
                content: content.to_string(),
            })
        }

        "/history" => {
            if rest.is_empty() {
                return Ok(SpecialCommand::History(None));
            }
            match rest.parse::<u32>() {
                Ok(limit) if limit > 0 => Ok(SpecialCommand::History(Some(limit))),
                _ => Err(CommandError::InvalidLimit(rest.to_string())),
            }
        }

        "/session" => {
            if rest.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/session".to_string(),
                    usage: "/session <session_id>".to_string(),
                })
            } else {
                Ok(SpecialCommand::Session(rest.to_string()))
            }
        }

        "/messages" => Ok(SpecialCommand::Messages),
        "/status" => Ok(SpecialCommand::ShowStatus),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" => Ok(SpecialCommand::Exit),

        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

fn parse_id(command: &str, id: &str) -> Result<u64, CommandError> {
    parse_server_id(id).map_err(|_| CommandError::InvalidMessageId {
        command: command.to_string(),
        id: id.to_string(),
    })
}

/// Display help information for special commands
///
/// # Examples
///
/// ```
/// use stockchat::commands::special_commands::print_help;
///
/// print_help();
/// ```
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat Mode
===========================================

GENERATION CONTROL:
  /stop                - Stop the answer currently streaming
  /regen [id]          - Regenerate the latest answer, or answer <id>
  /edit <id> <text>    - Replace message <id> and regenerate from there

SESSION:
  /history [limit]     - Reload the conversation from the server
  /session <id>        - Switch to another session
  /messages            - Show the transcript with message ids
  /status              - Show connection and session status

SESSION CONTROL:
  /help                - Show this help message
  /exit                - Exit interactive mode
  exit, quit           - Same as /exit

NOTES:
  - Commands are case-insensitive
  - Regular text (not starting with /) is sent as a question
  - Message ids are the numbers shown by /messages
"#
    );
}
