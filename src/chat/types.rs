//! Data model for a chat session
//!
//! Messages, thought steps and connection state as seen by the client. The
//! wire representations live in [`crate::chat::protocol`]; these are the
//! records the [`crate::chat::store::MessageStore`] holds.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Prefix of client-minted user message ids.
pub const USER_PLACEHOLDER_PREFIX: &str = "user-";

/// Prefix of client-minted assistant message ids.
pub const AI_PLACEHOLDER_PREFIX: &str = "ai-";

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Typed by the user
    User,
    /// Generated by the AI backend
    #[serde(alias = "ai")]
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Lifecycle status of a message.
///
/// `Pending` and `Streaming` are live; the other three are terminal and a
/// message in a terminal status is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Optimistically inserted, no server acknowledgment yet
    Pending,
    /// Content is accumulating from `token` events
    #[serde(alias = "generating")]
    Streaming,
    /// Terminal success
    #[default]
    Completed,
    /// Terminal, stopped on request
    Cancelled,
    /// Terminal, the server reported a failure
    #[serde(alias = "failed")]
    Error,
}

impl MessageStatus {
    /// Whether the status is terminal (completed, cancelled or error).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageStatus::Completed | MessageStatus::Cancelled | MessageStatus::Error
        )
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Streaming => "streaming",
            MessageStatus::Completed => "completed",
            MessageStatus::Cancelled => "cancelled",
            MessageStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Status of a single tool/reasoning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThoughtStatus {
    /// The tool is running
    Loading,
    /// The tool finished successfully
    Success,
    /// The tool failed
    Error,
    /// Queued, not started
    Pending,
}

/// An intermediate tool/reasoning annotation on an assistant message.
///
/// Steps are keyed by tool id; a later event for the same key replaces the
/// title and status in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtStep {
    /// Tool identifier, unique within one message
    pub key: String,
    /// Human-readable title
    pub title: String,
    /// Current status
    pub status: ThoughtStatus,
}

/// A single turn in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Placeholder id (`user-…` / `ai-…`) or the server id as a string
    pub id: String,
    /// Author
    pub role: Role,
    /// Accumulated text
    pub content: String,
    /// Lifecycle status
    pub status: MessageStatus,
    /// Tool/reasoning steps, in first-seen order
    #[serde(default)]
    pub thoughts: Vec<ThoughtStep>,
    /// Server-provided failure text when `status` is `Error`
    #[serde(default)]
    pub error: Option<String>,
}

impl ChatMessage {
    /// Create a message with no thoughts and no error.
    pub fn new(
        id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            status,
            thoughts: Vec::new(),
            error: None,
        }
    }

    /// Whether the id is still a client-minted placeholder.
    pub fn has_placeholder_id(&self) -> bool {
        is_placeholder_id(&self.id)
    }
}

/// Whether `id` was minted locally rather than assigned by the server.
///
/// # Examples
///
/// ```
/// use stockchat::chat::types::is_placeholder_id;
///
/// assert!(is_placeholder_id("ai-1000"));
/// assert!(is_placeholder_id("user-1000"));
/// assert!(!is_placeholder_id("42"));
/// ```
pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(USER_PLACEHOLDER_PREFIX) || id.starts_with(AI_PLACEHOLDER_PREFIX)
}

static PLACEHOLDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Mint a placeholder id from the local clock.
///
/// Ids are `<prefix><millis>-<seq>`; the process-wide sequence keeps ids
/// minted within the same millisecond distinct.
pub fn placeholder_id(prefix: &str) -> String {
    let seq = PLACEHOLDER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}{}-{seq}", chrono::Utc::now().timestamp_millis())
}

/// Transient state of the transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket
    #[default]
    Disconnected,
    /// Opening a socket
    Connecting,
    /// Socket is open
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Identity of one logical conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Server-confirmed session id, once known
    pub session_id: Option<String>,
    /// Ticker context
    pub symbol: Option<String>,
    /// AI model identifier
    pub model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!MessageStatus::Pending.is_terminal());
        assert!(!MessageStatus::Streaming.is_terminal());
        assert!(MessageStatus::Completed.is_terminal());
        assert!(MessageStatus::Cancelled.is_terminal());
        assert!(MessageStatus::Error.is_terminal());
    }

    #[test]
    fn test_placeholder_id_has_prefix() {
        let id = placeholder_id(AI_PLACEHOLDER_PREFIX);
        assert!(id.starts_with("ai-"));
        let (millis, seq) = id["ai-".len()..].split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert!(seq.parse::<u64>().is_ok());
        assert!(is_placeholder_id(&id));
    }

    #[test]
    fn test_placeholder_ids_minted_together_are_distinct() {
        let ids: Vec<String> = (0..100)
            .map(|_| placeholder_id(AI_PLACEHOLDER_PREFIX))
            .collect();
        let unique: std::collections::HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_role_accepts_ai_alias() {
        let role: Role = serde_json::from_str("\"ai\"").unwrap();
        assert_eq!(role, Role::Assistant);
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        let status: MessageStatus = serde_json::from_str("\"generating\"").unwrap();
        assert_eq!(status, MessageStatus::Streaming);
    }

    #[test]
    fn test_connection_state_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }
}
