//! Error types for StockChat
//!
//! This module defines all error types used throughout the client,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for StockChat operations
///
/// Covers configuration loading, connection setup, the wire protocol and
/// local precondition checks. Outbound chat intents never surface these;
/// they are returned from `connect` and from the command layer only.
#[derive(Error, Debug)]
pub enum StockChatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The chat endpoint could not be reached or closed before the handshake
    #[error("Connection error: {0}")]
    Connection(String),

    /// A transport-level failure on an open connection
    #[error("Transport error: {0}")]
    Transport(String),

    /// An inbound frame violated the envelope protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No `connection` envelope arrived within the handshake window
    #[error("Handshake timed out after {seconds}s")]
    HandshakeTimeout {
        /// Configured handshake timeout
        seconds: u64,
    },

    /// A message id given by the user is not a server-assigned numeric id
    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    /// The server reported a failed generation
    #[error("Generation failed: {0}")]
    Generation(String),

    /// An operation required an open connection
    #[error("Not connected to the chat server")]
    NotConnected,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// WebSocket protocol errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Result type alias for StockChat operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
