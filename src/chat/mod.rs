//! Stock chat session support
//!
//! This module provides the client side of the stock analysis chat service:
//!
//! - [`types`] -- messages, thought steps, connection state
//! - [`protocol`] -- outbound and inbound JSON envelopes
//! - [`endpoint`] -- endpoint URL construction from the hosting page URL
//! - [`transport`] -- the [`transport::Transport`] trait and its WebSocket
//!   implementation
//! - [`callbacks`] -- typed callback table and raw-frame listeners
//! - [`client`] -- [`client::ChatClient`], connection lifecycle and dispatch
//! - [`store`] -- [`store::MessageStore`], the message list reducer
//!
//! # Data flow
//!
//! ```text
//! user intent -> ChatClient::send_* -> Transport::send
//! Transport::receive -> read loop -> listeners -> typed callback -> MessageStore::apply
//! ```

pub mod callbacks;
pub mod client;
pub mod endpoint;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod types;

pub use callbacks::{ChatCallbacks, CloseEvent, ListenerId};
pub use client::{ChatClient, ClientSettings};
pub use endpoint::EndpointBuilder;
pub use store::{MessageStore, RenderMode};
pub use types::{ChatMessage, ConnectionState, MessageStatus, Role};
