//! Streaming chat client
//!
//! [`ChatClient`] owns one logical chat session over a [`Transport`]:
//!
//! - `connect` opens the endpoint and resolves with the session id carried by
//!   the server's first `connection` envelope.
//! - A background read loop decodes every inbound frame, hands the raw JSON to
//!   every general listener, then invokes the matching typed callback.
//! - An unexpected closure schedules a fixed-delay reconnect with the last
//!   confirmed session id, up to a configured number of attempts.
//! - Outbound intents (`send_message`, `cancel_generation`, ...) return
//!   `false` and send nothing while disconnected; they never error.
//!
//! # Generations
//!
//! Every open connection is stamped with a generation number and a
//! [`CancellationToken`]. `connect`, `disconnect` and each reconnect bump the
//! generation, so a read loop or reconnect timer belonging to an older
//! connection sees the mismatch and stands down instead of touching the
//! current one.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::chat::callbacks::{ChatCallbacks, CloseEvent, Listener, ListenerId, Listeners};
use crate::chat::endpoint::EndpointBuilder;
use crate::chat::protocol::{decode_frame, InboundEnvelope, OutboundEnvelope};
use crate::chat::transport::websocket::WebSocketConnector;
use crate::chat::transport::{Connector, Transport, TransportEvent};
use crate::chat::types::{ConnectionState, SessionInfo};
use crate::config::Config;
use crate::error::{Result, StockChatError};

/// Default number of automatic reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Default time to wait for the `connection` envelope.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection lifecycle tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each reconnect attempt
    pub reconnect_delay: Duration,
    /// How long `connect` waits for the `connection` envelope
    pub handshake_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl From<&Config> for ClientSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_reconnect_attempts: config.reconnect.max_attempts,
            reconnect_delay: Duration::from_millis(config.reconnect.delay_ms),
            handshake_timeout: Duration::from_secs(config.server.handshake_timeout_seconds),
        }
    }
}

/// The open connection, if any.
struct ActiveConnection {
    transport: Arc<dyn Transport>,
    token: CancellationToken,
    generation: u64,
}

/// Resolver for the `connect` call waiting on a handshake.
struct PendingHandshake {
    generation: u64,
    tx: oneshot::Sender<Result<String>>,
}

struct ClientInner {
    connector: Arc<dyn Connector>,
    endpoint: EndpointBuilder,
    settings: ClientSettings,
    connection: Mutex<Option<ActiveConnection>>,
    generation: AtomicU64,
    state_tx: watch::Sender<ConnectionState>,
    callbacks: Mutex<ChatCallbacks>,
    listeners: Mutex<Listeners>,
    attempts: AtomicU32,
    manual_close: AtomicBool,
    session: Mutex<SessionInfo>,
    handshake: Mutex<Option<PendingHandshake>>,
}

impl ClientInner {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!("Chat connection state: {previous} -> {state}");
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn callbacks(&self) -> ChatCallbacks {
        self.callbacks
            .lock()
            .map(|table| table.clone())
            .unwrap_or_default()
    }

    fn listeners(&self) -> Vec<Listener> {
        self.listeners
            .lock()
            .map(|registry| registry.snapshot())
            .unwrap_or_default()
    }

    fn session(&self) -> SessionInfo {
        self.session
            .lock()
            .map(|info| info.clone())
            .unwrap_or_default()
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.connection
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|c| Arc::clone(&c.transport)))
    }

    /// Take the connection out of the slot if it still belongs to `generation`.
    fn release(&self, generation: Option<u64>) -> Option<ActiveConnection> {
        let mut slot = self.connection.lock().ok()?;
        let stale = matches!(
            (slot.as_ref(), generation),
            (Some(active), Some(g)) if active.generation != g
        );
        if stale {
            None
        } else {
            slot.take()
        }
    }

    /// Resolve the pending `connect` call for `generation`, if any.
    fn settle_handshake(&self, generation: u64, outcome: Result<String>) {
        if let Some(pending) = self.take_handshake(generation) {
            let _ = pending.tx.send(outcome);
        }
    }

    fn take_handshake(&self, generation: u64) -> Option<PendingHandshake> {
        let mut slot = self.handshake.lock().ok()?;
        let matches = slot.as_ref().map_or(false, |p| p.generation == generation);
        if matches {
            slot.take()
        } else {
            None
        }
    }

    fn fire_close(&self, event: CloseEvent) {
        if let Some(f) = self.callbacks().on_close {
            f(&event);
        }
    }
}

/// A streaming chat client.
///
/// Cloning is cheap; clones share the same connection, callbacks and
/// listeners.
///
/// # Examples
///
/// ```no_run
/// use stockchat::chat::callbacks::ChatCallbacks;
/// use stockchat::chat::client::ChatClient;
/// use stockchat::config::Config;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let client = ChatClient::from_config(&Config::default())?;
/// client.set_callbacks(ChatCallbacks::new().on_token(|e| print!("{}", e.token)));
///
/// let session = client.connect(None, Some("AAPL"), None).await?;
/// println!("session {session}");
/// client.send_message("Is AAPL overbought?").await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("state", &self.inner.state())
            .field("session", &self.inner.session())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

impl ChatClient {
    /// Create a client over an arbitrary connector.
    pub fn new(
        connector: Arc<dyn Connector>,
        endpoint: EndpointBuilder,
        settings: ClientSettings,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ClientInner {
                connector,
                endpoint,
                settings,
                connection: Mutex::new(None),
                generation: AtomicU64::new(0),
                state_tx,
                callbacks: Mutex::new(ChatCallbacks::new()),
                listeners: Mutex::new(Listeners::default()),
                attempts: AtomicU32::new(0),
                manual_close: AtomicBool::new(false),
                session: Mutex::new(SessionInfo::default()),
                handshake: Mutex::new(None),
            }),
        }
    }

    /// Create a WebSocket client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StockChatError::Config`] if the configured page URL is not
    /// a valid absolute URL.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Arc::new(WebSocketConnector::new()),
            config.endpoint_builder()?,
            ClientSettings::from(config),
        ))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open the chat connection and wait for the server to confirm a session.
    ///
    /// Any existing connection is closed first. With a `session_id` the
    /// server resumes that conversation; without one it starts a fresh
    /// conversation using `symbol` and `model` as context.
    ///
    /// # Errors
    ///
    /// - [`StockChatError::Connection`] if the endpoint cannot be opened or
    ///   closes before the `connection` envelope arrives.
    /// - [`StockChatError::Transport`] if a transport error is reported
    ///   before the handshake completes.
    /// - [`StockChatError::HandshakeTimeout`] if no `connection` envelope
    ///   arrives within the configured timeout.
    pub async fn connect(
        &self,
        session_id: Option<&str>,
        symbol: Option<&str>,
        model: Option<&str>,
    ) -> Result<String> {
        let inner = &self.inner;
        teardown(inner);
        inner.manual_close.store(false, Ordering::SeqCst);
        inner.attempts.store(0, Ordering::SeqCst);

        if let Ok(mut session) = inner.session.lock() {
            *session = SessionInfo {
                session_id: session_id.filter(|s| !s.is_empty()).map(str::to_string),
                symbol: symbol.map(str::to_string),
                model: model.map(str::to_string),
            };
        }

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        if let Ok(mut slot) = inner.handshake.lock() {
            *slot = Some(PendingHandshake { generation, tx });
        }

        if let Err(e) = open_connection(inner, generation).await {
            if let Ok(mut slot) = inner.handshake.lock() {
                slot.take();
            }
            return Err(e);
        }

        let timeout = inner.settings.handshake_timeout;
        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(StockChatError::Connection(
                "connection closed before the server confirmed a session".to_string(),
            )
            .into()),
            Err(_) => {
                tracing::warn!("Chat handshake timed out after {}s", timeout.as_secs());
                if let Ok(mut slot) = inner.handshake.lock() {
                    slot.take();
                }
                Err(StockChatError::HandshakeTimeout {
                    seconds: timeout.as_secs(),
                }
                .into())
            }
        };

        // A rejected connect leaves nothing open behind it.
        if outcome.is_err() {
            if let Some(transport) = teardown(inner) {
                let _ = transport.close().await;
            }
        }
        outcome
    }

    /// Close the connection on the caller's behalf.
    ///
    /// No reconnect is scheduled and `on_close` is not invoked. Calling this
    /// while already disconnected does nothing.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.manual_close.store(true, Ordering::SeqCst);
        if let Some(transport) = teardown(inner) {
            tracing::info!("Disconnecting from chat server");
            if let Err(e) = transport.close().await {
                tracing::debug!("Error while closing chat transport: {e}");
            }
        }
    }

    /// Disconnect, then connect to another session.
    ///
    /// # Errors
    ///
    /// As [`ChatClient::connect`].
    pub async fn switch_session(&self, session_id: &str) -> Result<String> {
        let session = self.inner.session();
        self.disconnect().await;
        self.connect(
            Some(session_id),
            session.symbol.as_deref(),
            session.model.as_deref(),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Outbound intents
    // -----------------------------------------------------------------------

    /// Start a new generation from `text`. Returns whether it was sent.
    pub async fn send_message(&self, text: &str) -> bool {
        self.send_envelope(OutboundEnvelope::Message {
            message: text.to_string(),
        })
        .await
    }

    /// Ask the server to stop the in-flight generation.
    pub async fn cancel_generation(&self) -> bool {
        self.send_envelope(OutboundEnvelope::Cancel).await
    }

    /// Regenerate an assistant reply; `None` targets the latest one.
    pub async fn regenerate(&self, message_id: Option<u64>) -> bool {
        self.send_envelope(OutboundEnvelope::Regenerate { message_id })
            .await
    }

    /// Replace a message's content and regenerate from that point.
    pub async fn edit_message(&self, message_id: u64, content: &str) -> bool {
        self.send_envelope(OutboundEnvelope::EditMessage {
            message_id,
            content: content.to_string(),
        })
        .await
    }

    /// Request the most recent `limit` messages of the session.
    pub async fn get_history(&self, limit: u32) -> bool {
        self.send_envelope(OutboundEnvelope::GetHistory { limit })
            .await
    }

    async fn send_envelope(&self, envelope: OutboundEnvelope) -> bool {
        let transport = match self.inner.current_transport() {
            Some(t) if self.inner.state() == ConnectionState::Connected => t,
            _ => {
                tracing::debug!("Not connected; dropping outbound {envelope:?}");
                return false;
            }
        };
        let json = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to encode outbound envelope: {e}");
                return false;
            }
        };
        match transport.send(json).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Outbound envelope dropped: {e}");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// Merge `patch` into the callback table; slots it leaves empty keep
    /// their current callback.
    pub fn set_callbacks(&self, patch: ChatCallbacks) {
        if let Ok(mut table) = self.inner.callbacks.lock() {
            table.patch(patch);
        }
    }

    /// Register a listener for every decoded inbound frame.
    pub fn add_listener(
        &self,
        listener: impl Fn(&serde_json::Value) + Send + Sync + 'static,
    ) -> Option<ListenerId> {
        self.inner
            .listeners
            .lock()
            .ok()
            .map(|mut registry| registry.add(Arc::new(listener)))
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner
            .listeners
            .lock()
            .map(|mut registry| registry.remove(id))
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Whether the socket is open.
    pub fn is_connected(&self) -> bool {
        self.inner.state() == ConnectionState::Connected
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// The last server-confirmed (or requested) session id.
    pub fn session_id(&self) -> Option<String> {
        self.inner.session().session_id
    }

    /// Session identity: id, symbol and model.
    pub fn session(&self) -> SessionInfo {
        self.inner.session()
    }

    /// Reconnect attempts used since the last successful handshake.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Connection internals
// ---------------------------------------------------------------------------

/// Retire the current connection: bump the generation, cancel its read loop
/// and return its transport for closing.
fn teardown(inner: &Arc<ClientInner>) -> Option<Arc<dyn Transport>> {
    inner.generation.fetch_add(1, Ordering::SeqCst);
    let released = inner.release(None);
    inner.set_state(ConnectionState::Disconnected);
    released.map(|active| {
        active.token.cancel();
        active.transport
    })
}

/// Open a transport for `generation` and start its read loop.
async fn open_connection(inner: &Arc<ClientInner>, generation: u64) -> Result<()> {
    let session = inner.session();
    let url = inner.endpoint.build(
        session.session_id.as_deref(),
        session.symbol.as_deref(),
        session.model.as_deref(),
    )?;

    inner.set_state(ConnectionState::Connecting);
    tracing::info!("Connecting to chat endpoint {url}");

    let transport = match inner.connector.open(&url).await {
        Ok(t) => t,
        Err(e) => {
            if inner.is_current(generation) {
                inner.set_state(ConnectionState::Disconnected);
            }
            return Err(e);
        }
    };

    if !inner.is_current(generation) {
        // Superseded while the socket was opening.
        let _ = transport.close().await;
        return Ok(());
    }

    let token = CancellationToken::new();
    if let Ok(mut slot) = inner.connection.lock() {
        *slot = Some(ActiveConnection {
            transport: Arc::clone(&transport),
            token: token.clone(),
            generation,
        });
    }
    inner.set_state(ConnectionState::Connected);
    start_read_loop(Arc::clone(inner), transport, token, generation);
    Ok(())
}

/// Spawn the read loop for one connection.
fn start_read_loop(
    inner: Arc<ClientInner>,
    transport: Arc<dyn Transport>,
    cancellation: CancellationToken,
    generation: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = transport.receive();
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => {
                    tracing::debug!("Chat read loop cancelled (generation {generation})");
                    return;
                }

                next = events.next() => match next {
                    Some(TransportEvent::Message(raw)) => {
                        handle_frame(&inner, generation, &raw);
                    }
                    Some(TransportEvent::Error(message)) => {
                        handle_transport_error(&inner, generation, message);
                    }
                    None => break,
                },
            }
        }
        drop(events);
        handle_closed(&inner, generation);
    })
}

fn handle_frame(inner: &Arc<ClientInner>, generation: u64, raw: &str) {
    let frame = match decode_frame(raw) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Dropping inbound frame: {e}");
            return;
        }
    };

    if let InboundEnvelope::Connection(event) = &frame.event {
        tracing::info!("Chat session confirmed: {}", event.session_id);
        if let Ok(mut session) = inner.session.lock() {
            session.session_id = Some(event.session_id.clone());
        }
        inner.attempts.store(0, Ordering::SeqCst);
        inner.settle_handshake(generation, Ok(event.session_id.clone()));
    }

    for listener in inner.listeners() {
        listener(&frame.payload);
    }

    if let InboundEnvelope::Unknown(kind) = &frame.event {
        tracing::debug!("Ignoring inbound envelope of unknown type `{kind}`");
        return;
    }
    inner.callbacks().dispatch(&frame.event);
}

fn handle_transport_error(inner: &Arc<ClientInner>, generation: u64, message: String) {
    tracing::error!("Chat transport error: {message}");
    inner.settle_handshake(
        generation,
        Err(StockChatError::Transport(message.clone()).into()),
    );
    if let Some(f) = inner.callbacks().on_transport_error {
        f(&message);
    }
}

/// The inbound stream of `generation` ended.
fn handle_closed(inner: &Arc<ClientInner>, generation: u64) {
    if !inner.is_current(generation) {
        return;
    }
    if inner.release(Some(generation)).is_some() {
        inner.set_state(ConnectionState::Disconnected);
    }
    // Dropping the resolver rejects a `connect` still waiting on it; that
    // caller owns the failure, so no reconnect is scheduled.
    if inner.take_handshake(generation).is_some() {
        tracing::info!("Chat connection closed before the handshake");
        return;
    }
    if inner.manual_close.load(Ordering::SeqCst) {
        return;
    }
    tracing::info!("Chat connection closed unexpectedly");
    schedule_reconnect(inner, generation);
}

/// Schedule the next reconnect attempt after a closure or failed open.
fn schedule_reconnect(inner: &Arc<ClientInner>, generation: u64) {
    let max = inner.settings.max_reconnect_attempts;
    let used = inner.attempts.load(Ordering::SeqCst);
    if used >= max {
        tracing::warn!("Giving up on the chat server after {used} reconnect attempts");
        inner.set_state(ConnectionState::Disconnected);
        inner.fire_close(CloseEvent {
            will_retry: false,
            attempts: used,
        });
        return;
    }

    let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
    inner.fire_close(CloseEvent {
        will_retry: true,
        attempts: attempt,
    });

    let inner = Arc::clone(inner);
    let delay = inner.settings.reconnect_delay;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if inner.manual_close.load(Ordering::SeqCst) || !inner.is_current(generation) {
            tracing::debug!("Reconnect attempt {attempt} superseded");
            return;
        }
        let next = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Reconnect attempt {attempt}/{max}");
        if let Err(e) = open_connection(&inner, next).await {
            tracing::warn!("Reconnect attempt {attempt} failed: {e}");
            if inner.is_current(next) && !inner.manual_close.load(Ordering::SeqCst) {
                schedule_reconnect(&inner, next);
            }
        }
    });
}
