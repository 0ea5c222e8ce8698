use std::time::Duration;

use colored::Colorize;

use crate::chat::protocol::InboundEnvelope;
use crate::commands::render::print_transcript;
use crate::commands::session::{ChatSession, SessionEvent};
use crate::config::Config;
use crate::error::{Result, StockChatError};

/// Print the stored conversation of a session
///
/// Resumes `session_id`, requests the most recent
/// `config.chat.history_limit` messages and prints them with their ids.
///
/// # Errors
///
/// Returns an error if the session cannot be resumed or the history does
/// not arrive within the handshake timeout.
pub async fn show_history(config: Config, session_id: &str) -> Result<()> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(StockChatError::Config("a session id is required".to_string()).into());
    }

    let mut session = ChatSession::from_config(&config)?;
    let confirmed = session.client.connect(Some(session_id), None, None).await?;

    if !session.client.get_history(config.chat.history_limit).await {
        session.client.disconnect().await;
        return Err(StockChatError::NotConnected.into());
    }

    let outcome = session
        .run_until(
            Duration::from_secs(config.server.handshake_timeout_seconds),
            |_, _| {},
            |_, event| matches!(event, SessionEvent::Inbound(InboundEnvelope::History(_))),
        )
        .await;
    session.client.disconnect().await;
    outcome?;

    println!("\nSession {}:\n", confirmed.cyan());
    print_transcript(session.store.messages(), true, &mut std::io::stdout())?;
    println!();
    println!(
        "Use {} to continue this conversation.",
        format!("stockchat chat --session {confirmed}").cyan()
    );
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blank_session_id_is_rejected() {
        let err = show_history(Config::default(), "  ").await.unwrap_err();
        assert!(err.to_string().contains("session id is required"));
    }
}
