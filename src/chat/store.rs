//! Message store reducer
//!
//! [`MessageStore`] is the single mapping from (message list, inbound event)
//! to the next message list, plus the optimistic insertion done when the
//! user sends. Whether tool/reasoning steps are tracked is a configuration
//! choice ([`RenderMode`]), not a second reducer.
//!
//! # Id reconciliation
//!
//! The store tracks one *active generation target*: the id of the assistant
//! message currently receiving tokens. While that id is a client placeholder,
//! the first server id seen for the generation (`message_created`,
//! `generation_started`, or a `token` naming an id the store does not know)
//! rewrites it in place. List order and content are untouched.
//!
//! # Sealing
//!
//! Completed, cancelled and failed messages are terminal. Later events for
//! them are ignored, as are terminal events naming an id the store does not
//! hold (the list may have been replaced by `messages_updated` in between).

use crate::chat::protocol::{
    GenerationCompletedEvent, GenerationErrorEvent, InboundEnvelope, MessageCreatedEvent,
    MessageRefEvent, MessagesChangedEvent, ThoughtEvent, TokenEvent, WireMessage,
};
use crate::chat::types::{
    is_placeholder_id, placeholder_id, ChatMessage, MessageStatus, Role, ThoughtStep,
    AI_PLACEHOLDER_PREFIX, USER_PLACEHOLDER_PREFIX,
};

/// Which message features the store maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Content only; `thought` events are ignored
    #[default]
    Plain,
    /// Content plus tool/reasoning steps
    WithThoughts,
}

/// Ids minted by [`MessageStore::begin_send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticIds {
    /// Placeholder of the user message
    pub user_id: String,
    /// Placeholder of the assistant reply
    pub assistant_id: String,
}

/// Ordered conversation state for one session.
///
/// # Examples
///
/// ```
/// use stockchat::chat::protocol::{InboundEnvelope, MessageRefEvent, TokenEvent};
/// use stockchat::chat::store::{MessageStore, RenderMode};
///
/// let mut store = MessageStore::new(RenderMode::Plain);
/// store.begin_send("Is NVDA overbought?");
/// store.apply(&InboundEnvelope::GenerationStarted(MessageRefEvent { message_id: Some(42) }));
/// store.apply(&InboundEnvelope::Token(TokenEvent { message_id: Some(42), token: "RSI is 71".into() }));
///
/// assert_eq!(store.get("42").unwrap().content, "RSI is 71");
/// assert!(store.is_generating());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
    active_target: Option<String>,
    pending_user: Option<String>,
    mode: RenderMode,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// The configured render mode.
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Look up a message by id.
    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Id of the assistant message the current generation writes to.
    pub fn active_target(&self) -> Option<&str> {
        self.active_target.as_deref()
    }

    /// Whether a generation is in flight.
    pub fn is_generating(&self) -> bool {
        self.active_target
            .as_deref()
            .and_then(|id| self.get(id))
            .map_or(false, |m| !m.status.is_terminal())
    }

    /// The newest assistant message, if any.
    pub fn last_assistant(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Optimistically append the user's message and an assistant placeholder.
    ///
    /// Both are inserted in one update before anything reaches the network.
    /// Calling this again before the first exchange is reconciled replaces
    /// the tracked placeholders; only one generation per session is tracked.
    pub fn begin_send(&mut self, text: &str) -> OptimisticIds {
        let ids = OptimisticIds {
            user_id: placeholder_id(USER_PLACEHOLDER_PREFIX),
            assistant_id: placeholder_id(AI_PLACEHOLDER_PREFIX),
        };
        self.messages.push(ChatMessage::new(
            ids.user_id.clone(),
            Role::User,
            text,
            MessageStatus::Completed,
        ));
        self.messages.push(ChatMessage::new(
            ids.assistant_id.clone(),
            Role::Assistant,
            "",
            MessageStatus::Pending,
        ));
        self.pending_user = Some(ids.user_id.clone());
        self.active_target = Some(ids.assistant_id.clone());
        ids
    }

    /// Drop every message and the tracked ids.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.active_target = None;
        self.pending_user = None;
    }

    /// Seal the in-flight generation as failed without server involvement.
    ///
    /// Used when the server can no longer finish it: the question never
    /// left, or the connection carrying it was lost. Partial content is
    /// kept. Returns `false` when nothing is in flight.
    pub fn fail_active(&mut self, reason: &str) -> bool {
        let reason = reason.to_string();
        self.seal(None, |message| {
            message.status = MessageStatus::Error;
            message.error = Some(reason);
        })
    }

    /// Apply one inbound event. Returns whether the message list changed.
    pub fn apply(&mut self, event: &InboundEnvelope) -> bool {
        match event {
            InboundEnvelope::History(e) => self.replace_all(&e.messages),
            InboundEnvelope::MessagesDeleted(e) | InboundEnvelope::MessagesUpdated(e) => {
                self.apply_messages_changed(e)
            }
            InboundEnvelope::MessageCreated(e) => self.apply_message_created(e),
            InboundEnvelope::GenerationStarted(e) => self.apply_generation_started(e),
            InboundEnvelope::Token(e) => self.apply_token(e),
            InboundEnvelope::GenerationCompleted(e) => self.apply_completed(e),
            InboundEnvelope::GenerationCancelled(e) => self.apply_cancelled(e),
            InboundEnvelope::GenerationError(e) => self.apply_error(e),
            InboundEnvelope::RegenerationStarted(e) => self.apply_regeneration_started(e),
            InboundEnvelope::Thought(e) => self.apply_thought(e),
            InboundEnvelope::Connection(_)
            | InboundEnvelope::EditStarted
            | InboundEnvelope::Error(_)
            | InboundEnvelope::Unknown(_) => false,
        }
    }

    // -----------------------------------------------------------------------
    // List replacement
    // -----------------------------------------------------------------------

    fn replace_all(&mut self, messages: &[WireMessage]) -> bool {
        self.messages = messages.iter().map(ChatMessage::from).collect();
        self.pending_user = None;
        // Keep following a generation that survived the replacement.
        let still_live = self
            .active_target
            .as_deref()
            .and_then(|id| self.get(id))
            .map_or(false, |m| !m.status.is_terminal());
        if !still_live {
            self.active_target = None;
        }
        true
    }

    fn apply_messages_changed(&mut self, event: &MessagesChangedEvent) -> bool {
        match &event.messages {
            Some(messages) => self.replace_all(messages),
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Rewrite the placeholder `from` to `to` in place.
    fn rename(&mut self, from: &str, to: &str) -> bool {
        if from == to || self.get(to).is_some() {
            return false;
        }
        let Some(message) = self.messages.iter_mut().find(|m| m.id == from) else {
            return false;
        };
        message.id = to.to_string();
        if self.active_target.as_deref() == Some(from) {
            self.active_target = Some(to.to_string());
        }
        if self.pending_user.as_deref() == Some(from) {
            self.pending_user = None;
        }
        true
    }

    /// Reconcile the active target if it is still a placeholder.
    fn reconcile_active(&mut self, server_id: &str) -> bool {
        match self.active_target.clone() {
            Some(current) if is_placeholder_id(&current) => self.rename(&current, server_id),
            _ => false,
        }
    }

    fn apply_message_created(&mut self, event: &MessageCreatedEvent) -> bool {
        let mut changed = false;
        if let (Some(server), Some(placeholder)) =
            (event.user_message_id, self.pending_user.clone())
        {
            changed |= self.rename(&placeholder, &server.to_string());
        }
        if let Some(server) = event.ai_message_id {
            changed |= self.reconcile_active(&server.to_string());
        }
        changed
    }

    fn apply_generation_started(&mut self, event: &MessageRefEvent) -> bool {
        let Some(server) = event.message_id.map(|id| id.to_string()) else {
            return false;
        };
        if self.reconcile_active(&server) {
            return true;
        }
        if self.active_target.as_deref() == Some(server.as_str()) {
            return self.mark_streaming(&server);
        }
        if self.get(&server).is_some() {
            self.active_target = Some(server.clone());
            return self.mark_streaming(&server);
        }
        self.messages.push(ChatMessage::new(
            server.clone(),
            Role::Assistant,
            "",
            MessageStatus::Streaming,
        ));
        self.active_target = Some(server);
        true
    }

    fn apply_regeneration_started(&mut self, event: &MessageRefEvent) -> bool {
        let id = event
            .message_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| placeholder_id(AI_PLACEHOLDER_PREFIX));
        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == id) {
            // The server reuses the id: restart that message.
            existing.content.clear();
            existing.thoughts.clear();
            existing.error = None;
            existing.status = MessageStatus::Pending;
        } else {
            self.messages.push(ChatMessage::new(
                id.clone(),
                Role::Assistant,
                "",
                MessageStatus::Pending,
            ));
        }
        self.active_target = Some(id);
        true
    }

    fn mark_streaming(&mut self, id: &str) -> bool {
        match self.live_message_mut(id) {
            Some(message) if message.status == MessageStatus::Pending => {
                message.status = MessageStatus::Streaming;
                true
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------------

    /// Resolve the message an event targets: its own id, or the active target.
    ///
    /// An id the store has never seen, arriving while the active target is
    /// still a placeholder, is taken as the server id of that placeholder.
    fn resolve_streaming_target(&mut self, message_id: Option<u64>) -> Option<String> {
        match message_id.map(|id| id.to_string()) {
            Some(id) if self.get(&id).is_some() => Some(id),
            Some(id) => {
                if self.reconcile_active(&id) {
                    Some(id)
                } else {
                    None
                }
            }
            None => self.active_target.clone(),
        }
    }

    fn live_message_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .filter(|m| !m.status.is_terminal())
    }

    fn apply_token(&mut self, event: &TokenEvent) -> bool {
        let Some(id) = self.resolve_streaming_target(event.message_id) else {
            tracing::debug!("token for unknown message {:?}; ignoring", event.message_id);
            return false;
        };
        match self.live_message_mut(&id) {
            Some(message) => {
                message.content.push_str(&event.token);
                message.status = MessageStatus::Streaming;
                true
            }
            None => {
                tracing::debug!("token for sealed message {id}; ignoring");
                false
            }
        }
    }

    fn apply_thought(&mut self, event: &ThoughtEvent) -> bool {
        if self.mode == RenderMode::Plain {
            return false;
        }
        let Some(id) = self.resolve_streaming_target(event.message_id) else {
            return false;
        };
        let Some(message) = self.live_message_mut(&id) else {
            return false;
        };
        match message.thoughts.iter_mut().find(|t| t.key == event.tool) {
            Some(step) => {
                step.title = event.title.clone();
                step.status = event.status;
            }
            None => message.thoughts.push(ThoughtStep {
                key: event.tool.clone(),
                title: event.title.clone(),
                status: event.status,
            }),
        }
        true
    }

    // -----------------------------------------------------------------------
    // Terminal events
    // -----------------------------------------------------------------------

    /// Exact-match target of a terminal event.
    fn terminal_target(&self, message_id: Option<u64>) -> Option<String> {
        match message_id {
            Some(id) => Some(id.to_string()),
            None => self.active_target.clone(),
        }
    }

    /// Seal a message; returns `false` on a miss or an already sealed message.
    fn seal(&mut self, message_id: Option<u64>, f: impl FnOnce(&mut ChatMessage)) -> bool {
        let Some(id) = self.terminal_target(message_id) else {
            return false;
        };
        let Some(message) = self.live_message_mut(&id) else {
            tracing::debug!("terminal event for missing or sealed message {id}; ignoring");
            return false;
        };
        f(message);
        if self.active_target.as_deref() == Some(id.as_str()) {
            self.active_target = None;
        }
        true
    }

    fn apply_completed(&mut self, event: &GenerationCompletedEvent) -> bool {
        let content = event.message.clone();
        self.seal(event.message_id, |message| {
            message.content = content;
            message.status = MessageStatus::Completed;
        })
    }

    fn apply_cancelled(&mut self, event: &MessageRefEvent) -> bool {
        self.seal(event.message_id, |message| {
            message.status = MessageStatus::Cancelled;
        })
    }

    fn apply_error(&mut self, event: &GenerationErrorEvent) -> bool {
        let error = event.error.clone();
        self.seal(event.message_id, |message| {
            message.status = MessageStatus::Error;
            message.error = error;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::protocol::{HistoryEvent, WireId};
    use crate::chat::types::ThoughtStatus;

    fn token(id: Option<u64>, text: &str) -> InboundEnvelope {
        InboundEnvelope::Token(TokenEvent {
            message_id: id,
            token: text.to_string(),
        })
    }

    fn started(id: u64) -> InboundEnvelope {
        InboundEnvelope::GenerationStarted(MessageRefEvent {
            message_id: Some(id),
        })
    }

    fn completed(id: Option<u64>, text: &str) -> InboundEnvelope {
        InboundEnvelope::GenerationCompleted(GenerationCompletedEvent {
            message_id: id,
            message: text.to_string(),
        })
    }

    fn wire(id: u64, role: Role, content: &str) -> WireMessage {
        WireMessage {
            id: WireId::Number(id),
            role,
            content: content.to_string(),
            status: None,
        }
    }

    /// Store holding one assistant placeholder with a fixed id.
    fn store_with_placeholder(placeholder: &str) -> MessageStore {
        let mut store = MessageStore::new(RenderMode::Plain);
        store.messages.push(ChatMessage::new(
            placeholder,
            Role::Assistant,
            "",
            MessageStatus::Pending,
        ));
        store.active_target = Some(placeholder.to_string());
        store
    }

    #[test]
    fn test_begin_send_inserts_user_and_placeholder() {
        let mut store = MessageStore::new(RenderMode::Plain);
        let ids = store.begin_send("What about AAPL?");

        assert_eq!(store.messages().len(), 2);
        let user = &store.messages()[0];
        assert_eq!(user.id, ids.user_id);
        assert_eq!(user.role, Role::User);
        assert_eq!(user.status, MessageStatus::Completed);
        assert_eq!(user.content, "What about AAPL?");

        let ai = &store.messages()[1];
        assert_eq!(ai.id, ids.assistant_id);
        assert_eq!(ai.status, MessageStatus::Pending);
        assert_eq!(store.active_target(), Some(ids.assistant_id.as_str()));
        assert!(store.is_generating());
    }

    #[test]
    fn test_generation_started_reconciles_placeholder() {
        let mut store = store_with_placeholder("ai-1000");
        store.apply(&token(None, "partial"));

        assert!(store.apply(&started(42)));

        assert!(store.get("ai-1000").is_none());
        let message = store.get("42").unwrap();
        assert_eq!(message.content, "partial");
        assert_eq!(message.status, MessageStatus::Streaming);
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.active_target(), Some("42"));
    }

    #[test]
    fn test_message_created_reconciles_both_ids() {
        let mut store = MessageStore::new(RenderMode::Plain);
        let ids = store.begin_send("hi");

        store.apply(&InboundEnvelope::MessageCreated(MessageCreatedEvent {
            user_message_id: Some(7),
            ai_message_id: Some(8),
        }));

        assert!(store.get(&ids.user_id).is_none());
        assert!(store.get(&ids.assistant_id).is_none());
        assert_eq!(store.messages()[0].id, "7");
        assert_eq!(store.messages()[1].id, "8");
        assert_eq!(store.active_target(), Some("8"));

        // A later generation_started for the same id is a no-op rename.
        store.apply(&started(8));
        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.get("8").unwrap().status, MessageStatus::Streaming);
    }

    #[test]
    fn test_tokens_append_in_arrival_order() {
        let mut store = store_with_placeholder("ai-1");
        store.apply(&started(5));
        store.messages.push(ChatMessage::new(
            "6",
            Role::Assistant,
            "",
            MessageStatus::Streaming,
        ));

        for fragment in ["The ", "cat ", "sat"] {
            store.apply(&token(Some(5), fragment));
        }
        store.apply(&token(Some(6), "other"));

        assert_eq!(store.get("5").unwrap().content, "The cat sat");
        assert_eq!(store.get("6").unwrap().content, "other");
    }

    #[test]
    fn test_token_before_reconciliation_uses_pending_id() {
        let mut store = store_with_placeholder("ai-1000");

        // The server id arrives on the token before any creation event.
        assert!(store.apply(&token(Some(42), "Hello")));
        assert!(store.get("ai-1000").is_none());
        assert_eq!(store.get("42").unwrap().content, "Hello");

        // Late generation_started for the same id changes nothing.
        assert!(!store.apply(&started(42)));
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn test_completed_replaces_content_and_seals() {
        let mut store = store_with_placeholder("ai-1");
        store.apply(&started(3));
        store.apply(&token(Some(3), "fina"));

        assert!(store.apply(&completed(Some(3), "final text")));
        let message = store.get("3").unwrap();
        assert_eq!(message.content, "final text");
        assert_eq!(message.status, MessageStatus::Completed);
        assert!(!store.is_generating());

        // Stray token after completion must not mutate the sealed message.
        assert!(!store.apply(&token(Some(3), " extra")));
        assert_eq!(store.get("3").unwrap().content, "final text");

        // Nor may a second terminal event.
        assert!(!store.apply(&InboundEnvelope::GenerationError(
            GenerationErrorEvent {
                message_id: Some(3),
                error: Some("late".to_string()),
            }
        )));
        assert_eq!(store.get("3").unwrap().status, MessageStatus::Completed);
    }

    #[test]
    fn test_terminal_event_for_unknown_id_is_ignored() {
        let mut store = store_with_placeholder("ai-1");
        store.apply(&started(3));
        let before = store.messages().to_vec();

        assert!(!store.apply(&completed(Some(99), "nope")));
        assert!(!store.apply(&InboundEnvelope::GenerationCancelled(MessageRefEvent {
            message_id: Some(99)
        })));
        assert_eq!(store.messages(), before.as_slice());
    }

    #[test]
    fn test_cancel_keeps_partial_content() {
        let mut store = store_with_placeholder("ai-1");
        store.apply(&token(None, "half an ans"));
        assert!(store.apply(&InboundEnvelope::GenerationCancelled(MessageRefEvent {
            message_id: None
        })));
        let message = &store.messages()[0];
        assert_eq!(message.status, MessageStatus::Cancelled);
        assert_eq!(message.content, "half an ans");
        assert_eq!(store.active_target(), None);
    }

    #[test]
    fn test_error_preserves_partial_content_and_text() {
        let mut store = store_with_placeholder("ai-1");
        store.apply(&started(4));
        store.apply(&token(Some(4), "Support at 180"));
        store.apply(&InboundEnvelope::GenerationError(GenerationErrorEvent {
            message_id: Some(4),
            error: Some("model overloaded".to_string()),
        }));

        let message = store.get("4").unwrap();
        assert_eq!(message.status, MessageStatus::Error);
        assert_eq!(message.content, "Support at 180");
        assert_eq!(message.error.as_deref(), Some("model overloaded"));
    }

    #[test]
    fn test_history_replaces_store() {
        let mut store = MessageStore::new(RenderMode::Plain);
        store.begin_send("old");

        store.apply(&InboundEnvelope::History(HistoryEvent {
            messages: vec![
                wire(1, Role::User, "q"),
                wire(2, Role::Assistant, "a"),
            ],
        }));

        let ids: Vec<&str> = store.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(store.active_target(), None);
        assert!(!store.is_generating());
    }

    #[test]
    fn test_messages_updated_without_list_is_noop() {
        let mut store = store_with_placeholder("ai-1");
        assert!(!store.apply(&InboundEnvelope::MessagesUpdated(MessagesChangedEvent {
            messages: None
        })));
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn test_messages_deleted_then_generation_started_appends() {
        let mut store = MessageStore::new(RenderMode::Plain);
        store.apply(&InboundEnvelope::MessagesDeleted(MessagesChangedEvent {
            messages: Some(vec![wire(1, Role::User, "edited question")]),
        }));
        store.apply(&started(2));
        store.apply(&token(Some(2), "new answer"));

        assert_eq!(store.messages().len(), 2);
        let reply = store.get("2").unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "new answer");
        assert_eq!(reply.status, MessageStatus::Streaming);
    }

    #[test]
    fn test_regeneration_started_inserts_placeholder() {
        let mut store = MessageStore::new(RenderMode::Plain);
        store.apply(&InboundEnvelope::History(HistoryEvent {
            messages: vec![wire(1, Role::User, "q"), wire(2, Role::Assistant, "a")],
        }));

        assert!(store.apply(&InboundEnvelope::RegenerationStarted(MessageRefEvent {
            message_id: None
        })));
        assert_eq!(store.messages().len(), 3);
        let placeholder = store.messages()[2].clone();
        assert!(placeholder.has_placeholder_id());
        assert_eq!(placeholder.status, MessageStatus::Pending);

        store.apply(&started(3));
        assert_eq!(store.messages()[2].id, "3");
    }

    #[test]
    fn test_thoughts_upsert_by_key() {
        let mut store = MessageStore::new(RenderMode::WithThoughts);
        store.begin_send("analyze TSLA");

        let thought = |tool: &str, title: &str, status| {
            InboundEnvelope::Thought(ThoughtEvent {
                message_id: None,
                tool: tool.to_string(),
                title: title.to_string(),
                status,
            })
        };

        store.apply(&thought("macd", "Computing MACD", ThoughtStatus::Loading));
        store.apply(&thought("news", "Fetching news", ThoughtStatus::Loading));
        store.apply(&thought("macd", "MACD computed", ThoughtStatus::Success));

        let reply = &store.messages()[1];
        assert_eq!(reply.thoughts.len(), 2);
        assert_eq!(reply.thoughts[0].key, "macd");
        assert_eq!(reply.thoughts[0].title, "MACD computed");
        assert_eq!(reply.thoughts[0].status, ThoughtStatus::Success);
        assert_eq!(reply.thoughts[1].key, "news");
    }

    #[test]
    fn test_plain_mode_ignores_thoughts() {
        let mut store = MessageStore::new(RenderMode::Plain);
        store.begin_send("analyze TSLA");
        let changed = store.apply(&InboundEnvelope::Thought(ThoughtEvent {
            message_id: None,
            tool: "rsi".to_string(),
            title: "RSI".to_string(),
            status: ThoughtStatus::Loading,
        }));
        assert!(!changed);
        assert!(store.messages()[1].thoughts.is_empty());
    }

    #[test]
    fn test_advisory_and_unknown_events_do_not_mutate() {
        let mut store = store_with_placeholder("ai-1");
        let before = store.messages().to_vec();
        assert!(!store.apply(&InboundEnvelope::EditStarted));
        assert!(!store.apply(&InboundEnvelope::Unknown(
            "some_future_type".to_string()
        )));
        assert!(!store.apply(&InboundEnvelope::Error(Default::default())));
        assert_eq!(store.messages(), before.as_slice());
    }

    #[test]
    fn test_second_send_tracks_latest_placeholder() {
        let mut store = MessageStore::new(RenderMode::Plain);
        store.begin_send("one");
        let second = store.begin_send("two");
        assert_eq!(store.messages().len(), 4);
        assert_eq!(store.active_target(), Some(second.assistant_id.as_str()));
        assert_eq!(store.last_assistant().unwrap().status, MessageStatus::Pending);
    }

    #[test]
    fn test_fail_active_seals_in_flight_reply() {
        let mut store = MessageStore::new(RenderMode::Plain);
        store.begin_send("q");
        store.apply(&started(2));
        store.apply(&token(Some(2), "half"));
        assert!(store.is_generating());

        assert!(store.fail_active("connection lost"));
        assert!(!store.is_generating());
        let reply = store.get("2").unwrap();
        assert_eq!(reply.status, MessageStatus::Error);
        assert_eq!(reply.content, "half");
        assert_eq!(reply.error.as_deref(), Some("connection lost"));

        // Nothing left to fail; late tokens stay out.
        assert!(!store.fail_active("again"));
        assert!(!store.apply(&token(Some(2), "more")));
    }

    #[test]
    fn test_back_to_back_sends_reconcile_the_latest_reply() {
        let mut store = MessageStore::new(RenderMode::Plain);
        let first = store.begin_send("one");
        let second = store.begin_send("two");
        assert_ne!(first.assistant_id, second.assistant_id);
        assert_ne!(first.user_id, second.user_id);

        assert!(store.apply(&started(42)));
        assert!(store.get(&first.assistant_id).is_some());
        assert!(store.get(&second.assistant_id).is_none());
        assert_eq!(store.active_target(), Some("42"));
        assert_eq!(store.messages()[3].id, "42");
    }
}
