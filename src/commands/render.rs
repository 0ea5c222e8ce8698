//! Terminal rendering of a chat session
//!
//! [`Renderer`] turns applied [`SessionEvent`]s into incremental terminal
//! output: streamed tokens are printed as they arrive, the final content is
//! reconciled against what was already printed, and terminal statuses get a
//! short annotation.

use std::collections::HashMap;
use std::io::Write;

use colored::Colorize;

use crate::chat::callbacks::CloseEvent;
use crate::chat::protocol::InboundEnvelope;
use crate::chat::store::MessageStore;
use crate::chat::types::{is_placeholder_id, ChatMessage, MessageStatus, Role, ThoughtStatus};
use crate::commands::session::SessionEvent;

/// Incremental printer for one session.
#[derive(Debug, Default)]
pub struct Renderer {
    show_thoughts: bool,
    /// Message currently being streamed and how many bytes of it are printed
    streaming: Option<(String, usize)>,
    /// Last printed status per (message, tool)
    thoughts: HashMap<(String, String), ThoughtStatus>,
}

impl Renderer {
    /// Create a renderer; `show_thoughts` prints tool/reasoning steps.
    pub fn new(show_thoughts: bool) -> Self {
        Self {
            show_thoughts,
            ..Self::default()
        }
    }

    /// Whether a reply is mid-line on the terminal.
    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// Render one event that has already been applied to `store`.
    ///
    /// # Errors
    ///
    /// Returns any error from writing to `out`.
    pub fn render(
        &mut self,
        store: &MessageStore,
        event: &SessionEvent,
        out: &mut impl Write,
    ) -> std::io::Result<()> {
        match event {
            SessionEvent::Inbound(envelope) => self.render_envelope(store, envelope, out)?,
            SessionEvent::Closed(CloseEvent {
                will_retry: true,
                attempts,
            }) => {
                self.break_line(out)?;
                writeln!(
                    out,
                    "{}",
                    format!("Connection lost; reconnecting (attempt {attempts})...").yellow()
                )?;
            }
            SessionEvent::Closed(CloseEvent {
                will_retry: false,
                attempts,
            }) => {
                self.break_line(out)?;
                writeln!(out, "{}", disconnected_notice(*attempts).red())?;
            }
            SessionEvent::TransportError(message) => {
                self.break_line(out)?;
                writeln!(out, "{}", format!("Transport error: {message}").red())?;
            }
        }
        out.flush()
    }

    fn render_envelope(
        &mut self,
        store: &MessageStore,
        envelope: &InboundEnvelope,
        out: &mut impl Write,
    ) -> std::io::Result<()> {
        match envelope {
            InboundEnvelope::Connection(e) => {
                writeln!(out, "{}", format!("Connected to session {}", e.session_id).green())?;
            }
            InboundEnvelope::History(_) => {
                self.break_line(out)?;
                print_transcript(store.messages(), false, out)?;
            }
            InboundEnvelope::MessagesDeleted(e) | InboundEnvelope::MessagesUpdated(e) => {
                if e.messages.is_some() {
                    self.break_line(out)?;
                    writeln!(out, "{}", "Conversation updated".dimmed())?;
                }
            }
            InboundEnvelope::GenerationStarted(_) | InboundEnvelope::Token(_) => {
                if let Some(message) = store.active_target().and_then(|id| store.get(id)) {
                    self.stream(message, out)?;
                }
            }
            InboundEnvelope::GenerationCompleted(e) => {
                let id = e.message_id.map(|id| id.to_string());
                if let Some(message) = self.finished(store, id) {
                    self.stream(message, out)?;
                    self.end_stream(out)?;
                }
            }
            InboundEnvelope::GenerationCancelled(e) => {
                let id = e.message_id.map(|id| id.to_string());
                if self.finished(store, id).is_some() {
                    self.break_line(out)?;
                    writeln!(out, "{}", "[cancelled]".yellow())?;
                }
            }
            InboundEnvelope::GenerationError(e) => {
                let id = e.message_id.map(|id| id.to_string());
                if self.finished(store, id).is_some() {
                    self.break_line(out)?;
                    let text = e.error.as_deref().unwrap_or("generation failed");
                    writeln!(out, "{}", format!("[error: {text}]").red())?;
                }
            }
            InboundEnvelope::RegenerationStarted(_) => {
                self.break_line(out)?;
                writeln!(out, "{}", "Regenerating...".dimmed())?;
            }
            InboundEnvelope::EditStarted => {
                self.break_line(out)?;
                writeln!(out, "{}", "Applying edit...".dimmed())?;
            }
            InboundEnvelope::Thought(e) => {
                if self.show_thoughts {
                    let target = store.active_target().map(str::to_string).unwrap_or_default();
                    let key = (target, e.tool.clone());
                    if self.thoughts.get(&key) != Some(&e.status) {
                        self.thoughts.insert(key, e.status);
                        self.break_line(out)?;
                        writeln!(out, "  {} {}", thought_marker(e.status), e.title.dimmed())?;
                    }
                }
            }
            InboundEnvelope::Error(e) => {
                self.break_line(out)?;
                let text = e.message.as_deref().unwrap_or("server error");
                writeln!(out, "{}", format!("Server: {text}").yellow())?;
            }
            InboundEnvelope::MessageCreated(_) | InboundEnvelope::Unknown(_) => {}
        }
        Ok(())
    }

    /// The message a terminal event sealed, if the store accepted it.
    fn finished<'a>(&self, store: &'a MessageStore, id: Option<String>) -> Option<&'a ChatMessage> {
        let id = id.or_else(|| self.streaming.as_ref().map(|(id, _)| id.clone()))?;
        store.get(&id).filter(|m| m.status.is_terminal())
    }

    /// Print the part of `message` that has not been printed yet.
    fn stream(&mut self, message: &ChatMessage, out: &mut impl Write) -> std::io::Result<()> {
        let resumed = match &self.streaming {
            Some((id, printed)) if *id == message.id => Some(*printed),
            // A placeholder renamed to its server id keeps its printed prefix.
            Some((id, printed)) if is_placeholder_id(id) && message.content.len() >= *printed => {
                Some(*printed)
            }
            _ => None,
        };
        let printed = match resumed {
            Some(printed) => printed,
            None => {
                self.break_line(out)?;
                write!(out, "{} ", "ai>".cyan().bold())?;
                0
            }
        };

        let content = &message.content;
        let rest = if content.is_char_boundary(printed) && printed <= content.len() {
            &content[printed..]
        } else {
            // The final content diverged from the streamed text.
            writeln!(out)?;
            content.as_str()
        };
        write!(out, "{rest}")?;
        self.streaming = Some((message.id.clone(), content.len()));
        Ok(())
    }

    fn end_stream(&mut self, out: &mut impl Write) -> std::io::Result<()> {
        if self.streaming.take().is_some() {
            writeln!(out)?;
        }
        Ok(())
    }

    /// Finish a half-printed reply line before printing something else.
    fn break_line(&mut self, out: &mut impl Write) -> std::io::Result<()> {
        self.end_stream(out)
    }
}

fn thought_marker(status: ThoughtStatus) -> colored::ColoredString {
    match status {
        ThoughtStatus::Loading => "...".cyan(),
        ThoughtStatus::Pending => " - ".dimmed(),
        ThoughtStatus::Success => " ok".green(),
        ThoughtStatus::Error => "err".red(),
    }
}

/// The notice shown once reconnecting has been given up.
pub fn disconnected_notice(attempts: u32) -> String {
    format!(
        "Disconnected from the chat server after {attempts} reconnect attempts. \
         Use /session <id> to reconnect."
    )
}

/// Print messages oldest first; `with_ids` prefixes each with its id.
///
/// # Errors
///
/// Returns any error from writing to `out`.
pub fn print_transcript(
    messages: &[ChatMessage],
    with_ids: bool,
    out: &mut impl Write,
) -> std::io::Result<()> {
    if messages.is_empty() {
        return writeln!(out, "{}", "(no messages)".dimmed());
    }
    for message in messages {
        let who = match message.role {
            Role::User => "you>".green().bold(),
            Role::Assistant => "ai>".cyan().bold(),
        };
        if with_ids {
            write!(out, "{} ", format!("[{}]", message.id).dimmed())?;
        }
        write!(out, "{who} {}", message.content)?;
        match message.status {
            MessageStatus::Cancelled => write!(out, " {}", "[cancelled]".yellow())?,
            MessageStatus::Error => {
                let text = message.error.as_deref().unwrap_or("generation failed");
                write!(out, " {}", format!("[error: {text}]").red())?;
            }
            MessageStatus::Pending | MessageStatus::Streaming => {
                write!(out, " {}", "[generating]".dimmed())?
            }
            MessageStatus::Completed => {}
        }
        writeln!(out)?;
    }
    Ok(())
}
