//! Wiring between the chat client and a terminal command
//!
//! [`ChatSession`] registers forwarding callbacks on a [`ChatClient`] and
//! exposes every inbound envelope, close notice and transport error as a
//! [`SessionEvent`] on one channel. The command that owns the session
//! applies events to its [`MessageStore`] in arrival order, so the store
//! never needs to be shared with the read loop.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::chat::callbacks::{ChatCallbacks, CloseEvent};
use crate::chat::client::ChatClient;
use crate::chat::protocol::InboundEnvelope;
use crate::chat::store::{MessageStore, RenderMode};
use crate::config::Config;
use crate::error::{Result, StockChatError};

/// Something the terminal should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A decoded inbound envelope
    Inbound(InboundEnvelope),
    /// The connection went away without being asked to
    Closed(CloseEvent),
    /// A transport-level error was reported
    TransportError(String),
}

/// A chat client, its message store and the event channel between them.
#[derive(Debug)]
pub struct ChatSession {
    /// The connected client
    pub client: ChatClient,
    /// Conversation state
    pub store: MessageStore,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    interrupted: bool,
    resync: bool,
}

macro_rules! forward {
    ($tx:expr, $variant:ident) => {{
        let tx = $tx.clone();
        move |event: &_| {
            let _ = tx.send(SessionEvent::Inbound(InboundEnvelope::$variant(
                Clone::clone(event),
            )));
        }
    }};
}

/// Callback table forwarding every slot into `tx`.
pub fn forwarding_callbacks(tx: &mpsc::UnboundedSender<SessionEvent>) -> ChatCallbacks {
    let edit_tx = tx.clone();
    let close_tx = tx.clone();
    let error_tx = tx.clone();
    ChatCallbacks::new()
        .on_connect(forward!(tx, Connection))
        .on_history(forward!(tx, History))
        .on_message_created(forward!(tx, MessageCreated))
        .on_generation_started(forward!(tx, GenerationStarted))
        .on_token(forward!(tx, Token))
        .on_generation_completed(forward!(tx, GenerationCompleted))
        .on_generation_cancelled(forward!(tx, GenerationCancelled))
        .on_generation_error(forward!(tx, GenerationError))
        .on_messages_deleted(forward!(tx, MessagesDeleted))
        .on_messages_updated(forward!(tx, MessagesUpdated))
        .on_regeneration_started(forward!(tx, RegenerationStarted))
        .on_thought(forward!(tx, Thought))
        .on_error(forward!(tx, Error))
        .on_edit_started(move |_| {
            let _ = edit_tx.send(SessionEvent::Inbound(InboundEnvelope::EditStarted));
        })
        .on_close(move |event| {
            let _ = close_tx.send(SessionEvent::Closed(*event));
        })
        .on_transport_error(move |message| {
            let _ = error_tx.send(SessionEvent::TransportError(message.clone()));
        })
}

impl ChatSession {
    /// Wrap `client`, registering forwarding callbacks on it.
    pub fn new(client: ChatClient, mode: RenderMode) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        client.set_callbacks(forwarding_callbacks(&tx));
        Self {
            client,
            store: MessageStore::new(mode),
            events,
            interrupted: false,
            resync: false,
        }
    }

    /// Build a WebSocket session from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StockChatError::Config`] if the page URL is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mode = if config.chat.show_thoughts {
            RenderMode::WithThoughts
        } else {
            RenderMode::Plain
        };
        Ok(Self::new(ChatClient::from_config(config)?, mode))
    }

    /// Wait for the next event and apply it to the store.
    ///
    /// Returns `None` when the client side of the channel is gone.
    ///
    /// A closed connection can no longer finish the generation it carried,
    /// so that generation is sealed as failed. Once the next handshake
    /// arrives, [`Self::take_resync`] reports that the history should be
    /// reloaded.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let event = self.events.recv().await?;
        match &event {
            SessionEvent::Inbound(envelope) => {
                if matches!(envelope, InboundEnvelope::Connection(_)) && self.interrupted {
                    self.interrupted = false;
                    self.resync = true;
                }
                self.store.apply(envelope);
            }
            SessionEvent::Closed(_) => {
                if self
                    .store
                    .fail_active("connection lost before the answer finished")
                {
                    tracing::info!("Connection lost mid-answer; marking it failed");
                    self.interrupted = true;
                }
            }
            SessionEvent::TransportError(_) => {}
        }
        Some(event)
    }

    /// Whether the history should be reloaded after an interrupted answer.
    pub fn take_resync(&mut self) -> bool {
        std::mem::take(&mut self.resync)
    }

    /// Switch to another session with a clean store.
    ///
    /// Events still queued from the previous connection are discarded so
    /// they cannot leak into the new conversation.
    ///
    /// # Errors
    ///
    /// As [`ChatClient::switch_session`].
    pub async fn switch_session(&mut self, session_id: &str) -> Result<String> {
        self.client.disconnect().await;
        let mut discarded = 0usize;
        while self.events.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!("Discarded {} events from the previous session", discarded);
        }
        self.store.clear();
        self.interrupted = false;
        self.resync = false;
        self.client.switch_session(session_id).await
    }

    /// Apply events until `done` holds for one of them.
    ///
    /// Every event, including the one that satisfied `done`, is passed to
    /// `on_event` after it was applied.
    ///
    /// # Errors
    ///
    /// Returns [`StockChatError::Connection`] if the connection is lost for
    /// good, or [`StockChatError::Transport`] if nothing satisfies `done`
    /// within `timeout`.
    pub async fn run_until(
        &mut self,
        timeout: Duration,
        on_event: impl FnMut(&MessageStore, &SessionEvent),
        done: impl FnMut(&MessageStore, &SessionEvent) -> bool,
    ) -> Result<()> {
        match tokio::time::timeout(timeout, self.wait_for(on_event, done)).await {
            Ok(result) => result,
            Err(_) => Err(StockChatError::Transport(format!(
                "no response from the chat server within {}s",
                timeout.as_secs()
            ))
            .into()),
        }
    }

    async fn wait_for(
        &mut self,
        mut on_event: impl FnMut(&MessageStore, &SessionEvent),
        mut done: impl FnMut(&MessageStore, &SessionEvent) -> bool,
    ) -> Result<()> {
        while let Some(event) = self.next_event().await {
            on_event(&self.store, &event);
            if done(&self.store, &event) {
                return Ok(());
            }
            if let SessionEvent::Closed(CloseEvent {
                will_retry: false, ..
            }) = event
            {
                return Err(StockChatError::Connection(
                    "lost connection to the chat server".to_string(),
                )
                .into());
            }
        }
        Err(StockChatError::Connection("chat session ended".to_string()).into())
    }
}
