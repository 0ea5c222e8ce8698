//! Observer registration for inbound envelopes
//!
//! [`ChatCallbacks`] holds one named slot per inbound event type. Callers
//! build a partial table and hand it to
//! [`crate::chat::client::ChatClient::set_callbacks`], which merges it with
//! [`ChatCallbacks::patch`]: slots set in the patch replace the current ones,
//! empty slots leave the current ones alone.
//!
//! [`Listeners`] is the second, untyped channel: every decoded frame is
//! handed to every listener as raw JSON before typed dispatch.

use std::sync::Arc;

use crate::chat::protocol::{
    ConnectionEvent, ErrorEvent, GenerationCompletedEvent, GenerationErrorEvent, HistoryEvent,
    InboundEnvelope, MessageCreatedEvent, MessageRefEvent, MessagesChangedEvent, ThoughtEvent,
    TokenEvent,
};

/// A typed event callback.
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Raw-frame listener.
pub type Listener = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Why the connection went away, delivered to `on_close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseEvent {
    /// An automatic reconnect has been scheduled
    pub will_retry: bool,
    /// Reconnect attempts used so far
    pub attempts: u32,
}

macro_rules! callback_table {
    ($( $(#[$doc:meta])* $slot:ident : $event:ty ),* $(,)?) => {
        /// One optional callback per inbound event type.
        #[derive(Clone, Default)]
        pub struct ChatCallbacks {
            $( $(#[$doc])* pub $slot: Option<Handler<$event>>, )*
        }

        impl ChatCallbacks {
            $(
                $(#[$doc])*
                pub fn $slot(mut self, f: impl Fn(&$event) + Send + Sync + 'static) -> Self {
                    self.$slot = Some(Arc::new(f));
                    self
                }
            )*

            /// Merge `other` into `self`; only slots set in `other` change.
            pub fn patch(&mut self, other: ChatCallbacks) {
                $(
                    if other.$slot.is_some() {
                        self.$slot = other.$slot;
                    }
                )*
            }

            /// Names of the slots that hold a callback.
            pub fn registered(&self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $(
                    if self.$slot.is_some() {
                        names.push(stringify!($slot));
                    }
                )*
                names
            }
        }
    };
}

callback_table! {
    /// `connection`: the server confirmed a session
    on_connect: ConnectionEvent,
    /// `history`
    on_history: HistoryEvent,
    /// `message_created`
    on_message_created: MessageCreatedEvent,
    /// `generation_started`
    on_generation_started: MessageRefEvent,
    /// `token`
    on_token: TokenEvent,
    /// `generation_completed`
    on_generation_completed: GenerationCompletedEvent,
    /// `generation_cancelled`
    on_generation_cancelled: MessageRefEvent,
    /// `generation_error`
    on_generation_error: GenerationErrorEvent,
    /// `messages_deleted`
    on_messages_deleted: MessagesChangedEvent,
    /// `messages_updated`
    on_messages_updated: MessagesChangedEvent,
    /// `edit_started`
    on_edit_started: (),
    /// `regeneration_started`
    on_regeneration_started: MessageRefEvent,
    /// `thought`
    on_thought: ThoughtEvent,
    /// `error`
    on_error: ErrorEvent,
    /// The connection closed without the caller asking for it
    on_close: CloseEvent,
    /// A transport-level error event
    on_transport_error: String,
}

impl ChatCallbacks {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke the callback matching `event`, if one is registered.
    ///
    /// Returns `true` when a callback ran.
    pub fn dispatch(&self, event: &InboundEnvelope) -> bool {
        fn call<E>(slot: &Option<Handler<E>>, event: &E) -> bool {
            match slot {
                Some(f) => {
                    f(event);
                    true
                }
                None => false,
            }
        }

        match event {
            InboundEnvelope::Connection(e) => call(&self.on_connect, e),
            InboundEnvelope::History(e) => call(&self.on_history, e),
            InboundEnvelope::MessageCreated(e) => call(&self.on_message_created, e),
            InboundEnvelope::GenerationStarted(e) => call(&self.on_generation_started, e),
            InboundEnvelope::Token(e) => call(&self.on_token, e),
            InboundEnvelope::GenerationCompleted(e) => call(&self.on_generation_completed, e),
            InboundEnvelope::GenerationCancelled(e) => call(&self.on_generation_cancelled, e),
            InboundEnvelope::GenerationError(e) => call(&self.on_generation_error, e),
            InboundEnvelope::MessagesDeleted(e) => call(&self.on_messages_deleted, e),
            InboundEnvelope::MessagesUpdated(e) => call(&self.on_messages_updated, e),
            InboundEnvelope::EditStarted => call(&self.on_edit_started, &()),
            InboundEnvelope::RegenerationStarted(e) => call(&self.on_regeneration_started, e),
            InboundEnvelope::Thought(e) => call(&self.on_thought, e),
            InboundEnvelope::Error(e) => call(&self.on_error, e),
            InboundEnvelope::Unknown(_) => false,
        }
    }
}

impl std::fmt::Debug for ChatCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCallbacks")
            .field("registered", &self.registered())
            .finish()
    }
}

/// Handle returned by [`Listeners::add`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered registry of raw-frame listeners.
#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    /// Register a listener; listeners run in registration order.
    pub fn add(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Snapshot of the current listeners, so they can run without a lock held.
    pub fn snapshot(&self) -> Vec<Listener> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}
