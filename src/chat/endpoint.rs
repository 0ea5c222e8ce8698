//! Chat endpoint URL construction
//!
//! The socket is served from the same origin as the dashboard page, so the
//! endpoint mirrors the page's scheme security, host and port. Tunneling
//! services multiplex on their default port, which means a hostname under
//! one of their suffixes never carries an explicit port.

use url::Url;

use crate::error::{Result, StockChatError};

/// Default resource path of the chat endpoint.
pub const DEFAULT_WS_PATH: &str = "/ws/stock-chat/";

/// Hostname suffixes of tunneling services recognized by default.
pub const DEFAULT_TUNNEL_SUFFIXES: &[&str] = &[
    ".ngrok-free.app",
    ".ngrok.app",
    ".ngrok.io",
    ".trycloudflare.com",
    ".loca.lt",
];

/// Builds chat endpoint URLs relative to the hosting page.
///
/// # Examples
///
/// ```
/// use stockchat::chat::endpoint::EndpointBuilder;
/// use url::Url;
///
/// let page = Url::parse("https://example.com:8443/app").unwrap();
/// let builder = EndpointBuilder::new(page);
/// let url = builder.build(Some("abc"), None, None).unwrap();
/// assert_eq!(url.as_str(), "wss://example.com:8443/ws/stock-chat/abc/");
/// ```
#[derive(Debug, Clone)]
pub struct EndpointBuilder {
    page_url: Url,
    path: String,
    tunnel_suffixes: Vec<String>,
}

impl EndpointBuilder {
    /// Create a builder for `page_url` with the default path and suffixes.
    pub fn new(page_url: Url) -> Self {
        Self {
            page_url,
            path: DEFAULT_WS_PATH.to_string(),
            tunnel_suffixes: DEFAULT_TUNNEL_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Override the resource path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Override the recognized tunnel suffixes.
    pub fn with_tunnel_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.tunnel_suffixes = suffixes;
        self
    }

    /// Whether the page is served over a secure origin.
    pub fn is_secure(&self) -> bool {
        matches!(self.page_url.scheme(), "https" | "wss")
    }

    /// Whether the page host belongs to a tunneling service.
    pub fn is_tunnel_host(&self) -> bool {
        let Some(host) = self.page_url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.tunnel_suffixes.iter().any(|suffix| {
            let suffix = suffix.to_ascii_lowercase();
            host.ends_with(&suffix) || host == suffix.trim_start_matches('.')
        })
    }

    /// Build the endpoint URL.
    ///
    /// The session id, when present, is appended as one path segment and
    /// `symbol`/`model` are dropped, since a resumed session already carries
    /// its context. A fresh session carries them as query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`StockChatError::Config`] if the page URL has no host.
    pub fn build(
        &self,
        session_id: Option<&str>,
        symbol: Option<&str>,
        model: Option<&str>,
    ) -> Result<Url> {
        let host = self.page_url.host_str().ok_or_else(|| {
            StockChatError::Config(format!("page URL has no host: {}", self.page_url))
        })?;

        let scheme = if self.is_secure() { "wss" } else { "ws" };
        let authority = match self.page_url.port() {
            Some(port) if !self.is_tunnel_host() => format!("{host}:{port}"),
            _ => host.to_string(),
        };

        let mut url = Url::parse(&format!("{scheme}://{authority}/"))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StockChatError::Config("endpoint URL cannot be a base".to_string()))?;
            segments.clear();
            segments.extend(self.path.split('/').filter(|s| !s.is_empty()));
            if let Some(session) = session_id.filter(|s| !s.is_empty()) {
                segments.push(session);
            }
            // Trailing slash
            segments.push("");
        }

        if session_id.map_or(true, str::is_empty) {
            let params: Vec<(&str, &str)> = [("symbol", symbol), ("model", model)]
                .into_iter()
                .filter_map(|(key, value)| {
                    value.filter(|v| !v.is_empty()).map(|v| (key, v))
                })
                .collect();
            if !params.is_empty() {
                url.query_pairs_mut().extend_pairs(params);
            }
        }

        Ok(url)
    }
}
