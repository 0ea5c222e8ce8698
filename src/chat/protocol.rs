//! Wire envelopes for the stock chat endpoint
//!
//! Every frame on the connection is a single JSON object with a `type`
//! discriminator. Outbound envelopes are produced by [`OutboundEnvelope`];
//! inbound text frames are decoded by [`decode_frame`] into an
//! [`InboundFrame`], which keeps the raw payload for general listeners next
//! to the typed [`InboundEnvelope`] used for callback dispatch.
//!
//! Server message ids are integers on the wire. The client stores them as
//! strings so that they share one id space with client-minted placeholders.

use serde::{Deserialize, Serialize};

use crate::chat::types::{ChatMessage, MessageStatus, Role, ThoughtStatus};
use crate::error::{Result, StockChatError};

// ---------------------------------------------------------------------------
// Envelope type names
// ---------------------------------------------------------------------------

/// Handshake: carries the session id.
pub const TYPE_CONNECTION: &str = "connection";
/// Full message list answering `get_history`.
pub const TYPE_HISTORY: &str = "history";
/// Server ids for the user message and its reply.
pub const TYPE_MESSAGE_CREATED: &str = "message_created";
/// A generation began.
pub const TYPE_GENERATION_STARTED: &str = "generation_started";
/// One streamed fragment.
pub const TYPE_TOKEN: &str = "token";
/// Final authoritative content.
pub const TYPE_GENERATION_COMPLETED: &str = "generation_completed";
/// The generation was stopped.
pub const TYPE_GENERATION_CANCELLED: &str = "generation_cancelled";
/// The generation failed server-side.
pub const TYPE_GENERATION_ERROR: &str = "generation_error";
/// Message list after a deletion.
pub const TYPE_MESSAGES_DELETED: &str = "messages_deleted";
/// Message list after an update.
pub const TYPE_MESSAGES_UPDATED: &str = "messages_updated";
/// Advisory: an edit is being processed.
pub const TYPE_EDIT_STARTED: &str = "edit_started";
/// A regeneration began.
pub const TYPE_REGENERATION_STARTED: &str = "regeneration_started";
/// Tool/reasoning step update.
pub const TYPE_THOUGHT: &str = "thought";
/// Advisory error.
pub const TYPE_ERROR: &str = "error";

/// Every inbound `type` the client understands.
pub const KNOWN_INBOUND_TYPES: &[&str] = &[
    TYPE_CONNECTION,
    TYPE_HISTORY,
    TYPE_MESSAGE_CREATED,
    TYPE_GENERATION_STARTED,
    TYPE_TOKEN,
    TYPE_GENERATION_COMPLETED,
    TYPE_GENERATION_CANCELLED,
    TYPE_GENERATION_ERROR,
    TYPE_MESSAGES_DELETED,
    TYPE_MESSAGES_UPDATED,
    TYPE_EDIT_STARTED,
    TYPE_REGENERATION_STARTED,
    TYPE_THOUGHT,
    TYPE_ERROR,
];

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// An intent sent from the client to the server.
///
/// # Examples
///
/// ```
/// use stockchat::chat::protocol::OutboundEnvelope;
///
/// let json = OutboundEnvelope::Cancel.to_json().unwrap();
/// assert_eq!(json, r#"{"type":"cancel"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    /// Start a new generation from user text
    Message {
        /// The user's text
        message: String,
    },
    /// Stop the in-flight generation
    Cancel,
    /// Regenerate a reply; `None` lets the server pick the latest one
    Regenerate {
        /// Target assistant message
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<u64>,
    },
    /// Replace a message's content and regenerate from there
    EditMessage {
        /// Message to edit
        message_id: u64,
        /// Replacement content
        content: String,
    },
    /// Ask for the most recent `limit` messages
    GetHistory {
        /// Maximum number of messages
        limit: u32,
    },
}

impl OutboundEnvelope {
    /// Serialize to a single-line JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`StockChatError::Serialization`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StockChatError::Serialization(e).into())
    }
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

/// A message id that may arrive as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    /// Numeric server id
    Number(u64),
    /// String id
    Text(String),
}

impl std::fmt::Display for WireId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireId::Number(n) => write!(f, "{n}"),
            WireId::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A stored message as returned by `history` and the `messages_*` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Server id
    pub id: WireId,
    /// Author
    pub role: Role,
    /// Full content
    #[serde(default)]
    pub content: String,
    /// Stored status; absent means completed
    #[serde(default)]
    pub status: Option<MessageStatus>,
}

impl From<&WireMessage> for ChatMessage {
    fn from(wire: &WireMessage) -> Self {
        ChatMessage::new(
            wire.id.to_string(),
            wire.role,
            wire.content.clone(),
            wire.status.unwrap_or_default(),
        )
    }
}

/// `connection`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    /// Server-confirmed session id
    pub session_id: String,
}

/// `history`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HistoryEvent {
    /// Messages, oldest first
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

/// `message_created`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MessageCreatedEvent {
    /// Server id of the stored user message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message_id: Option<u64>,
    /// Server id of the assistant reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_message_id: Option<u64>,
}

/// Events that only identify a message: `generation_started`,
/// `generation_cancelled`, `regeneration_started`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MessageRefEvent {
    /// Target message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
}

/// `token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    /// Target message; absent means the active generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
    /// Fragment to append
    pub token: String,
}

/// `generation_completed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationCompletedEvent {
    /// Target message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
    /// Authoritative final content
    pub message: String,
}

/// `generation_error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GenerationErrorEvent {
    /// Target message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
    /// Server-provided failure text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `messages_deleted` / `messages_updated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MessagesChangedEvent {
    /// Replacement list, when the server sends one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<WireMessage>>,
}

/// `thought`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtEvent {
    /// Target message; absent means the active generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
    /// Tool key
    pub tool: String,
    /// Human-readable title
    pub title: String,
    /// Step status
    pub status: ThoughtStatus,
}

/// `error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorEvent {
    /// Advisory text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A decoded inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEnvelope {
    /// Handshake
    Connection(ConnectionEvent),
    /// Full history
    History(HistoryEvent),
    /// Server ids assigned to a new exchange
    MessageCreated(MessageCreatedEvent),
    /// A generation began
    GenerationStarted(MessageRefEvent),
    /// Streamed fragment
    Token(TokenEvent),
    /// Terminal success
    GenerationCompleted(GenerationCompletedEvent),
    /// Terminal cancel
    GenerationCancelled(MessageRefEvent),
    /// Terminal failure
    GenerationError(GenerationErrorEvent),
    /// List after deletion
    MessagesDeleted(MessagesChangedEvent),
    /// List after update
    MessagesUpdated(MessagesChangedEvent),
    /// Advisory
    EditStarted,
    /// A regeneration began
    RegenerationStarted(MessageRefEvent),
    /// Tool/reasoning step
    Thought(ThoughtEvent),
    /// Advisory error
    Error(ErrorEvent),
    /// A `type` this client does not know
    #[serde(skip)]
    Unknown(String),
}

impl InboundEnvelope {
    /// The wire `type` of this envelope.
    pub fn kind(&self) -> &str {
        match self {
            InboundEnvelope::Connection(_) => TYPE_CONNECTION,
            InboundEnvelope::History(_) => TYPE_HISTORY,
            InboundEnvelope::MessageCreated(_) => TYPE_MESSAGE_CREATED,
            InboundEnvelope::GenerationStarted(_) => TYPE_GENERATION_STARTED,
            InboundEnvelope::Token(_) => TYPE_TOKEN,
            InboundEnvelope::GenerationCompleted(_) => TYPE_GENERATION_COMPLETED,
            InboundEnvelope::GenerationCancelled(_) => TYPE_GENERATION_CANCELLED,
            InboundEnvelope::GenerationError(_) => TYPE_GENERATION_ERROR,
            InboundEnvelope::MessagesDeleted(_) => TYPE_MESSAGES_DELETED,
            InboundEnvelope::MessagesUpdated(_) => TYPE_MESSAGES_UPDATED,
            InboundEnvelope::EditStarted => TYPE_EDIT_STARTED,
            InboundEnvelope::RegenerationStarted(_) => TYPE_REGENERATION_STARTED,
            InboundEnvelope::Thought(_) => TYPE_THOUGHT,
            InboundEnvelope::Error(_) => TYPE_ERROR,
            InboundEnvelope::Unknown(kind) => kind,
        }
    }
}

/// One decoded inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// The raw JSON object, handed to general listeners
    pub payload: serde_json::Value,
    /// Typed form used for callback dispatch
    pub event: InboundEnvelope,
}

/// Decode a single inbound text frame.
///
/// Unknown `type` values decode to [`InboundEnvelope::Unknown`] rather than
/// failing, so that newer servers do not break older clients.
///
/// # Errors
///
/// Returns [`StockChatError::Protocol`] if the frame is not a JSON object
/// with a string `type`, or if a known type is missing required fields.
///
/// # Examples
///
/// ```
/// use stockchat::chat::protocol::{decode_frame, InboundEnvelope};
///
/// let frame = decode_frame(r#"{"type":"token","message_id":7,"token":"Hi"}"#).unwrap();
/// assert!(matches!(frame.event, InboundEnvelope::Token(_)));
///
/// let frame = decode_frame(r#"{"type":"some_future_type"}"#).unwrap();
/// assert_eq!(frame.event.kind(), "some_future_type");
/// ```
pub fn decode_frame(raw: &str) -> Result<InboundFrame> {
    let payload: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| StockChatError::Protocol(format!("frame is not valid JSON: {e}")))?;

    let kind = payload
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| StockChatError::Protocol("frame has no string `type` field".to_string()))?
        .to_string();

    if !KNOWN_INBOUND_TYPES.contains(&kind.as_str()) {
        return Ok(InboundFrame {
            payload,
            event: InboundEnvelope::Unknown(kind),
        });
    }

    let event: InboundEnvelope = serde_json::from_value(payload.clone())
        .map_err(|e| StockChatError::Protocol(format!("malformed `{kind}` envelope: {e}")))?;

    Ok(InboundFrame { payload, event })
}

/// Parse a user-supplied message id into a server id.
///
/// Placeholders and other non-numeric ids are rejected locally so that an
/// edit or regenerate request never reaches the server with an id it cannot
/// resolve.
///
/// # Errors
///
/// Returns [`StockChatError::InvalidMessageId`] for non-numeric ids.
///
/// # Examples
///
/// ```
/// use stockchat::chat::protocol::parse_server_id;
///
/// assert_eq!(parse_server_id("42").unwrap(), 42);
/// assert!(parse_server_id("ai-1000").is_err());
/// ```
pub fn parse_server_id(id: &str) -> Result<u64> {
    id.trim()
        .parse::<u64>()
        .map_err(|_| StockChatError::InvalidMessageId(id.to_string()).into())
}
