//! One-shot question mode
//!
//! Connects, sends a single question, streams the answer to stdout and
//! disconnects once the generation reaches a terminal state.

use std::time::Duration;

use crate::chat::protocol::InboundEnvelope;
use crate::chat::types::MessageStatus;
use crate::commands::render::Renderer;
use crate::commands::session::{ChatSession, SessionEvent};
use crate::config::Config;
use crate::error::{Result, StockChatError};

/// Upper bound on how long one answer may take to finish streaming.
pub const ASK_TIMEOUT: Duration = Duration::from_secs(300);

/// Whether `event` ends the generation started by the question.
fn ends_generation(event: &SessionEvent) -> bool {
    matches!(
        event,
        SessionEvent::Inbound(
            InboundEnvelope::GenerationCompleted(_)
                | InboundEnvelope::GenerationCancelled(_)
                | InboundEnvelope::GenerationError(_)
        )
    )
}

/// Ask one question and print the streamed answer
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `prompt` - The question to send
/// * `session_id` - Session to continue; `None` starts a fresh one
///
/// # Errors
///
/// - Any connection error from the handshake
/// - [`StockChatError::Generation`] if the server reports a failed answer
/// - [`StockChatError::Transport`] if the answer does not finish in time
pub async fn run_ask(config: Config, prompt: &str, session_id: Option<String>) -> Result<()> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(StockChatError::Config("the question must not be empty".to_string()).into());
    }

    let mut session = ChatSession::from_config(&config)?;
    let mut renderer = Renderer::new(config.chat.show_thoughts);
    let mut stdout = std::io::stdout();

    let confirmed = session
        .client
        .connect(
            session_id.as_deref(),
            config.chat.symbol.as_deref(),
            config.chat.model.as_deref(),
        )
        .await?;
    tracing::debug!("Asking in session {}", confirmed);

    session.store.begin_send(prompt);
    if !session.client.send_message(prompt).await {
        session.client.disconnect().await;
        return Err(StockChatError::NotConnected.into());
    }

    let outcome = session
        .run_until(
            ASK_TIMEOUT,
            |store, event| {
                // A resumed session may replay its history first; only the new answer is printed.
                if matches!(
                    event,
                    SessionEvent::Inbound(InboundEnvelope::History(_) | InboundEnvelope::Connection(_))
                ) {
                    return;
                }
                if let Err(e) = renderer.render(store, event, &mut stdout) {
                    tracing::warn!("Failed to write answer: {}", e);
                }
            },
            |store, event| {
                (ends_generation(event) || matches!(event, SessionEvent::Closed(_)))
                    && !store.is_generating()
            },
        )
        .await;
    session.client.disconnect().await;
    outcome?;

    match session.store.last_assistant() {
        Some(message) if message.status == MessageStatus::Error => Err(StockChatError::Generation(
            message
                .error
                .clone()
                .unwrap_or_else(|| "generation failed".to_string()),
        )
        .into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::protocol::{GenerationCompletedEvent, TokenEvent};

    #[test]
    fn test_terminal_events_end_generation() {
        let completed = SessionEvent::Inbound(InboundEnvelope::GenerationCompleted(
            GenerationCompletedEvent {
                message_id: Some(2),
                message: "done".to_string(),
            },
        ));
        assert!(ends_generation(&completed));

        let token = SessionEvent::Inbound(InboundEnvelope::Token(TokenEvent {
            message_id: Some(2),
            token: "x".to_string(),
        }));
        assert!(!ends_generation(&token));
        assert!(!ends_generation(&SessionEvent::TransportError("x".to_string())));
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected_before_connecting() {
        let err = run_ask(Config::default(), "   ", None).await.unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }
}
