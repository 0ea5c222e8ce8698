//! Configuration management for StockChat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Precedence, lowest to highest: built-in defaults, the YAML file,
//! `STOCKCHAT_*` environment variables, command-line flags.

use crate::chat::endpoint::{EndpointBuilder, DEFAULT_TUNNEL_SUFFIXES, DEFAULT_WS_PATH};
use crate::error::{Result, StockChatError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Main configuration structure for StockChat
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Where the chat endpoint lives
    #[serde(default)]
    pub server: ServerConfig,
    /// Automatic reconnect policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Chat session defaults
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Chat endpoint location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// URL of the dashboard page; the endpoint mirrors its origin
    #[serde(default = "default_page_url")]
    pub page_url: String,

    /// Resource path of the chat endpoint
    #[serde(default = "default_ws_path")]
    pub path: String,

    /// Hostname suffixes of tunneling services (port is omitted for these)
    #[serde(default = "default_tunnel_suffixes")]
    pub tunnel_suffixes: Vec<String>,

    /// Seconds to wait for the server to confirm a session
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_seconds: u64,
}

fn default_page_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_ws_path() -> String {
    DEFAULT_WS_PATH.to_string()
}

fn default_tunnel_suffixes() -> Vec<String> {
    DEFAULT_TUNNEL_SUFFIXES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_handshake_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            page_url: default_page_url(),
            path: default_ws_path(),
            tunnel_suffixes: default_tunnel_suffixes(),
            handshake_timeout_seconds: default_handshake_timeout(),
        }
    }
}

/// Reconnect policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Attempts after an unexpected closure before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts (milliseconds)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_delay_ms() -> u64 {
    1000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Chat session defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Default `get_history` limit
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Render tool/reasoning steps
    #[serde(default)]
    pub show_thoughts: bool,

    /// Default ticker symbol for fresh sessions
    #[serde(default)]
    pub symbol: Option<String>,

    /// Default AI model for fresh sessions
    #[serde(default)]
    pub model: Option<String>,
}

fn default_history_limit() -> u32 {
    50
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            show_thoughts: false,
            symbol: None,
            model: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StockChatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| StockChatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(page_url) = std::env::var("STOCKCHAT_PAGE_URL") {
            self.server.page_url = page_url;
        }

        if let Ok(path) = std::env::var("STOCKCHAT_WS_PATH") {
            self.server.path = path;
        }

        if let Ok(attempts) = std::env::var("STOCKCHAT_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(value) = attempts.parse() {
                self.reconnect.max_attempts = value;
            } else {
                tracing::warn!("Invalid STOCKCHAT_MAX_RECONNECT_ATTEMPTS: {}", attempts);
            }
        }

        if let Ok(delay) = std::env::var("STOCKCHAT_RECONNECT_DELAY_MS") {
            if let Ok(value) = delay.parse() {
                self.reconnect.delay_ms = value;
            } else {
                tracing::warn!("Invalid STOCKCHAT_RECONNECT_DELAY_MS: {}", delay);
            }
        }

        if let Ok(limit) = std::env::var("STOCKCHAT_HISTORY_LIMIT") {
            if let Ok(value) = limit.parse() {
                self.chat.history_limit = value;
            } else {
                tracing::warn!("Invalid STOCKCHAT_HISTORY_LIMIT: {}", limit);
            }
        }

        if let Ok(show) = std::env::var("STOCKCHAT_SHOW_THOUGHTS") {
            match show.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.chat.show_thoughts = true,
                "0" | "false" | "no" | "off" => self.chat.show_thoughts = false,
                _ => tracing::warn!("Invalid STOCKCHAT_SHOW_THOUGHTS: {}", show),
            }
        }

        if let Ok(symbol) = std::env::var("STOCKCHAT_SYMBOL") {
            self.chat.symbol = Some(symbol).filter(|s| !s.is_empty());
        }

        if let Ok(model) = std::env::var("STOCKCHAT_MODEL") {
            self.chat.model = Some(model).filter(|m| !m.is_empty());
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(page_url) = &cli.page_url {
            self.server.page_url = page_url.clone();
        }

        use crate::cli::Commands;
        let (symbol, model, thoughts) = match &cli.command {
            Commands::Chat {
                symbol,
                model,
                thoughts,
                ..
            }
            | Commands::Ask {
                symbol,
                model,
                thoughts,
                ..
            } => (symbol, model, *thoughts),
            Commands::Endpoint { symbol, model, .. } => (symbol, model, false),
            Commands::History { limit, .. } => {
                if let Some(limit) = limit {
                    self.chat.history_limit = *limit;
                }
                return;
            }
        };
        if symbol.is_some() {
            self.chat.symbol = symbol.clone();
        }
        if model.is_some() {
            self.chat.model = model.clone();
        }
        if thoughts {
            self.chat.show_thoughts = true;
        }
    }

    /// Parse the configured page URL.
    ///
    /// # Errors
    ///
    /// Returns [`StockChatError::Config`] if the URL does not parse.
    pub fn page_url(&self) -> Result<Url> {
        Url::parse(&self.server.page_url).map_err(|e| {
            StockChatError::Config(format!(
                "Invalid page_url '{}': {}",
                self.server.page_url, e
            ))
            .into()
        })
    }

    /// Endpoint builder for the configured server.
    ///
    /// # Errors
    ///
    /// Returns [`StockChatError::Config`] if the page URL does not parse.
    pub fn endpoint_builder(&self) -> Result<EndpointBuilder> {
        Ok(EndpointBuilder::new(self.page_url()?)
            .with_path(self.server.path.clone())
            .with_tunnel_suffixes(self.server.tunnel_suffixes.clone()))
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let page_url = self.page_url()?;

        let valid_schemes = ["http", "https", "ws", "wss"];
        if !valid_schemes.contains(&page_url.scheme()) {
            return Err(StockChatError::Config(format!(
                "Invalid page_url scheme: {}. Must be one of: {}",
                page_url.scheme(),
                valid_schemes.join(", ")
            ))
            .into());
        }

        if page_url.host_str().map_or(true, str::is_empty) {
            return Err(StockChatError::Config("page_url must have a host".to_string()).into());
        }

        if !self.server.path.starts_with('/') || !self.server.path.ends_with('/') {
            return Err(StockChatError::Config(format!(
                "server.path must start and end with '/': {}",
                self.server.path
            ))
            .into());
        }

        if self.server.handshake_timeout_seconds == 0 {
            return Err(StockChatError::Config(
                "server.handshake_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.reconnect.delay_ms == 0 {
            return Err(StockChatError::Config(
                "reconnect.delay_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.history_limit == 0 {
            return Err(StockChatError::Config(
                "chat.history_limit must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.history_limit > 1000 {
            return Err(StockChatError::Config(
                "chat.history_limit must be less than or equal to 1000".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
