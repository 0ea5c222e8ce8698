//! WebSocket transport for the chat endpoint
//!
//! [`WebSocketConnector`] performs the HTTP upgrade with `tokio-tungstenite`
//! and returns a [`WebSocketTransport`]. Two background Tokio tasks are
//! started per connection: one writes queued frames to the socket, one reads
//! frames into the inbound channel exposed by [`Transport::receive`].
//!
//! Only text frames carry envelopes. Binary frames are accepted when they
//! hold UTF-8; ping/pong are handled by tungstenite; a close frame or a read
//! error ends the inbound stream.

use std::pin::Pin;
use std::sync::Arc;

use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::chat::transport::{Connector, Transport, TransportEvent};
use crate::error::{Result, StockChatError};

/// Frames queued for the writer task.
#[derive(Debug)]
enum OutboundFrame {
    Text(String),
    Close,
}

/// Opens WebSocket connections.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<Arc<dyn Transport>> {
        let transport = WebSocketTransport::connect(url).await?;
        Ok(Arc::new(transport))
    }
}

/// An open WebSocket connection.
#[derive(Debug)]
pub struct WebSocketTransport {
    /// Queue drained by the writer task.
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
    /// Events produced by the reader task.
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl WebSocketTransport {
    /// Perform the upgrade handshake and start the reader/writer tasks.
    ///
    /// # Errors
    ///
    /// Returns [`StockChatError::Connection`] if the TCP connection or the
    /// upgrade fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use stockchat::chat::transport::websocket::WebSocketTransport;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> anyhow::Result<()> {
    /// let url = url::Url::parse("ws://localhost:8000/ws/stock-chat/")?;
    /// let transport = WebSocketTransport::connect(&url).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &Url) -> Result<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| StockChatError::Connection(format!("failed to open {url}: {e}")))?;
        tracing::debug!("WebSocket connected to {url}");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<TransportEvent>();

        // Cancelled when the reader stops, so the writer drops its sender
        // and the inbound stream can end.
        let reader_done = CancellationToken::new();

        // Writer: queued frames -> socket.
        let error_tx = inbound_tx.clone();
        let writer_done = reader_done.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    biased;
                    _ = writer_done.cancelled() => break,
                    frame = outbound_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                match frame {
                    OutboundFrame::Text(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            let _ = error_tx.send(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    OutboundFrame::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        });

        // Reader: socket -> inbound events.
        tokio::spawn(async move {
            let _done = reader_done.drop_guard();
            while let Some(item) = source.next().await {
                let event = match item {
                    Ok(Message::Text(text)) => TransportEvent::Message(text),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => TransportEvent::Message(text),
                        Err(_) => {
                            tracing::debug!("WebSocket: dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        tracing::debug!("WebSocket: close frame received: {frame:?}");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                };
                if inbound_tx.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            outbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
        })
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, message: String) -> Result<()> {
        self.outbound_tx
            .send(OutboundFrame::Text(message))
            .map_err(|_| StockChatError::Transport("WebSocket writer has stopped".to_string()).into())
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = TransportEvent> + Send + '_>> {
        let rx = Arc::clone(&self.inbound_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    async fn close(&self) -> Result<()> {
        // The writer may already be gone; closing twice is fine.
        let _ = self.outbound_tx.send(OutboundFrame::Close);
        Ok(())
    }
}
