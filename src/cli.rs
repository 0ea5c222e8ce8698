//! Command-line interface definition for StockChat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, one-shot questions, history
//! retrieval and endpoint inspection.

use clap::{Parser, Subcommand};

/// StockChat - terminal client for the stock analysis AI chat service
///
/// Streams AI answers about a ticker over the dashboard's chat socket.
#[derive(Parser, Debug, Clone)]
#[command(name = "stockchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    pub json_logs: bool,

    /// URL of the dashboard page hosting the chat endpoint
    #[arg(long, global = true)]
    pub page_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for StockChat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Resume an existing session instead of starting a fresh one
        #[arg(long)]
        session: Option<String>,

        /// Ticker symbol giving the conversation its context
        #[arg(short, long)]
        symbol: Option<String>,

        /// AI model identifier
        #[arg(short, long)]
        model: Option<String>,

        /// Show tool/reasoning steps while answers stream
        #[arg(short, long)]
        thoughts: bool,
    },

    /// Ask a single question and print the answer
    Ask {
        /// The question to send
        prompt: String,

        /// Ticker symbol giving the conversation its context
        #[arg(short, long)]
        symbol: Option<String>,

        /// AI model identifier
        #[arg(short, long)]
        model: Option<String>,

        /// Ask within an existing session
        #[arg(long)]
        session: Option<String>,

        /// Show tool/reasoning steps while the answer streams
        #[arg(short, long)]
        thoughts: bool,
    },

    /// Print the stored messages of a session
    History {
        /// Session to read
        #[arg(long)]
        session: String,

        /// Maximum number of messages to request
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Print the chat endpoint URL without connecting
    Endpoint {
        /// Session to resume
        #[arg(long)]
        session: Option<String>,

        /// Ticker symbol for a fresh session
        #[arg(short, long)]
        symbol: Option<String>,

        /// AI model identifier for a fresh session
        #[arg(short, long)]
        model: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            page_url: None,
            command: Commands::Endpoint {
                session: None,
                symbol: None,
                model: None,
            },
        }
    }
}
