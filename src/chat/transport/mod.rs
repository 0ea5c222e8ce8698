//! Chat transport abstraction and implementations
//!
//! This module defines the [`Transport`] trait for one open chat connection
//! and the [`Connector`] trait that opens them. Concrete implementations
//! live in submodules:
//!
//! - [`websocket::WebSocketConnector`] -- opens `ws://`/`wss://` connections
//!   with `tokio-tungstenite`, one JSON envelope per text frame.
//! - [`fake::FakeConnector`] -- in-process fake used in tests (cfg(test)
//!   only).
//!
//! # Design
//!
//! The [`Transport`] trait is intentionally minimal: callers `send` a
//! serialized envelope and `receive` a stream of [`TransportEvent`]s. The
//! stream ending means the connection closed. Reconnection is not a
//! transport concern; [`crate::chat::client::ChatClient`] decides when to
//! call [`Connector::open`] again.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use url::Url;

use crate::error::Result;

/// Something that happened on an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete text frame
    Message(String),
    /// A transport-level error; the connection may still be open
    Error(String),
}

/// One open, bidirectional chat connection.
///
/// Implementations are shared as `Arc<dyn Transport>` between the read loop
/// and the outbound intent methods.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send one serialized envelope as a single text frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StockChatError::Transport`] if the connection
    /// is no longer writable.
    async fn send(&self, message: String) -> Result<()>;

    /// Stream of inbound events. The stream ends when the connection closes.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = TransportEvent> + Send + '_>>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&self) -> Result<()>;
}

/// Opens [`Transport`]s to an endpoint URL.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Open a connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StockChatError::Connection`] if the endpoint
    /// cannot be reached or refuses the upgrade.
    async fn open(&self, url: &Url) -> Result<Arc<dyn Transport>>;
}

pub mod websocket;

#[cfg(test)]
pub mod fake;
