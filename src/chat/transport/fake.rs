//! In-process fake transport for chat client tests
//!
//! [`FakeConnector`] hands out [`FakeTransport`]s and publishes the matching
//! [`FakeTransportHandle`] for every successful open, so a test can play the
//! server side:
//!
//! - Read what the client sent: `handle.outbound_rx.recv().await`
//! - Inject server envelopes: `handle.inject(json!({...}))`
//! - Simulate a server-side close: `handle.drop_connection()`
//!
//! ```text
//! client send() -----> outbound_tx -----> outbound_rx (handle reads)
//! handle inbound_tx -> inbound_tx  -----> inbound_rx  (client receive())
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::chat::transport::{Connector, Transport, TransportEvent};
use crate::error::{Result, StockChatError};

/// In-process fake transport.
#[derive(Debug)]
pub struct FakeTransport {
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<TransportEvent>>>,
    closed: CancellationToken,
}

impl FakeTransport {
    /// Create a `(FakeTransport, FakeTransportHandle)` pair.
    pub fn new() -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<TransportEvent>();
        let closed = CancellationToken::new();

        let transport = Self {
            outbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            closed: closed.clone(),
        };
        let handle = FakeTransportHandle {
            outbound_rx,
            inbound_tx,
            closed,
        };
        (transport, handle)
    }
}

/// The test-side handle for a [`FakeTransport`].
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Envelopes the client sent
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Events the client will receive
    pub inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    closed: CancellationToken,
}

impl FakeTransportHandle {
    /// Inject a JSON value as an inbound text frame.
    pub fn inject(&self, value: serde_json::Value) {
        self.inject_raw(value.to_string());
    }

    /// Inject a raw text frame.
    pub fn inject_raw(&self, raw: impl Into<String>) {
        let _ = self.inbound_tx.send(TransportEvent::Message(raw.into()));
    }

    /// Inject a transport-level error event.
    pub fn inject_error(&self, message: impl Into<String>) {
        let _ = self.inbound_tx.send(TransportEvent::Error(message.into()));
    }

    /// End the client's inbound stream as if the server went away.
    pub fn drop_connection(&self) {
        self.closed.cancel();
    }

    /// Whether either side closed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Collect everything the client has sent so far, parsed as JSON.
    pub fn drain_sent(&mut self) -> Vec<serde_json::Value> {
        let mut sent = Vec::new();
        while let Ok(raw) = self.outbound_rx.try_recv() {
            if let Ok(value) = serde_json::from_str(&raw) {
                sent.push(value);
            }
        }
        sent
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(&self, message: String) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(StockChatError::Transport("fake connection closed".to_string()).into());
        }
        self.outbound_tx.send(message).map_err(|e| {
            StockChatError::Transport(format!("fake outbound channel closed: {e}")).into()
        })
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = TransportEvent> + Send + '_>> {
        let rx = Arc::clone(&self.inbound_rx);
        let closed = self.closed.clone();
        Box::pin(futures::stream::unfold(
            (rx, closed),
            |(rx, closed)| async move {
                let item = {
                    let mut guard = rx.lock().await;
                    tokio::select! {
                        biased;
                        _ = closed.cancelled() => None,
                        item = guard.recv() => item,
                    }
                };
                item.map(|event| (event, (rx, closed)))
            },
        ))
    }

    async fn close(&self) -> Result<()> {
        self.closed.cancel();
        Ok(())
    }
}

/// Connector that hands out [`FakeTransport`]s.
///
/// Every successful open publishes its handle on `handles_rx`. When
/// `fail_opens` is set, `open` fails and only counts the attempt.
#[derive(Debug)]
pub struct FakeConnector {
    handles_tx: mpsc::UnboundedSender<FakeTransportHandle>,
    opened_urls: std::sync::Mutex<Vec<Url>>,
    attempts: AtomicUsize,
    fail_opens: AtomicBool,
}

impl FakeConnector {
    /// Create a connector and the receiver of its handles.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeTransportHandle>) {
        let (handles_tx, handles_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            handles_tx,
            opened_urls: std::sync::Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_opens: AtomicBool::new(false),
        });
        (connector, handles_rx)
    }

    /// A connector whose opens always fail.
    pub fn failing() -> Arc<Self> {
        let (connector, _rx) = Self::new();
        connector.set_fail_opens(true);
        connector
    }

    /// Make subsequent opens fail (or succeed again).
    pub fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Number of `open` calls so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// URLs of every `open` call so far.
    pub fn opened_urls(&self) -> Vec<Url> {
        self.opened_urls
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn open(&self, url: &Url) -> Result<Arc<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut urls) = self.opened_urls.lock() {
            urls.push(url.clone());
        }
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(StockChatError::Connection(format!("fake refused {url}")).into());
        }
        let (transport, handle) = FakeTransport::new();
        let _ = self.handles_tx.send(handle);
        Ok(Arc::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::StreamExt;

    #[tokio::test]
    async fn test_send_delivers_to_handle() {
        let (transport, mut handle) = FakeTransport::new();
        transport.send(r#"{"type":"cancel"}"#.to_string()).await.unwrap();
        let sent = handle.outbound_rx.recv().await.unwrap();
        assert_eq!(sent, r#"{"type":"cancel"}"#);
    }

    #[tokio::test]
    async fn test_receive_yields_injected_frames_in_order() {
        let (transport, handle) = FakeTransport::new();
        for i in 0u32..3 {
            handle.inject_raw(format!("frame-{i}"));
        }
        let mut stream = transport.receive();
        for i in 0u32..3 {
            let event = tokio::time::timeout(Duration::from_secs(2), stream.next())
                .await
                .expect("timed out")
                .expect("stream ended");
            assert_eq!(event, TransportEvent::Message(format!("frame-{i}")));
        }
    }

    #[tokio::test]
    async fn test_drop_connection_ends_stream() {
        let (transport, handle) = FakeTransport::new();
        let mut stream = transport.receive();
        handle.drop_connection();
        let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out");
        assert!(next.is_none());
        assert!(transport.send("x".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_connector_counts_attempts() {
        let connector = FakeConnector::failing();
        let url = Url::parse("ws://localhost/ws/stock-chat/").unwrap();
        assert!(connector.open(&url).await.is_err());
        assert!(connector.open(&url).await.is_err());
        assert_eq!(connector.attempts(), 2);
        assert_eq!(connector.opened_urls().len(), 2);
    }
}
