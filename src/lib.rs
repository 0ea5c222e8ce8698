//! StockChat - terminal client library for the stock analysis AI chat service
//!
//! This library provides the client side of a streaming chat session with
//! an AI stock analyst: the WebSocket session protocol, its reconnect
//! policy, and the message store that turns inbound events into an ordered
//! conversation.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `chat`: Session protocol, transport, client and message store
//! - `commands`: Terminal command handlers
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `logging`: Tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use stockchat::{ChatClient, Config, MessageStore, RenderMode};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let client = ChatClient::from_config(&config)?;
//!     let session = client.connect(None, Some("AAPL"), None).await?;
//!     let mut store = MessageStore::new(RenderMode::Plain);
//!     store.begin_send("Is AAPL overbought?");
//!     client.send_message("Is AAPL overbought?").await;
//!     println!("session {session}");
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use chat::{ChatClient, ChatMessage, ConnectionState, MessageStore, RenderMode};
pub use config::Config;
pub use error::{Result, StockChatError};
