//! Transport abstraction over a bidirectional message stream.
//!
//! The connection actor talks to the wire through a pair of bounded
//! channels, so the production WebSocket transport and the fakes used in
//! tests are interchangeable. Closing is by drop: releasing
//! [`TransportStreams`] tears the connection down.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// The connection could not be established.
#[derive(Debug, Error)]
#[error("transport open failed: {reason}")]
pub struct TransportError {
    /// What went wrong, in transport-specific terms.
    pub reason: String,
}

impl TransportError {
    /// Wrap a transport-specific failure description.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Something that happened on an open connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame.
    Message(String),
    /// The connection closed, with the peer's reason if it gave one.
    Closed {
        /// Close reason, if any.
        reason: Option<String>,
    },
}

/// Channel pair for one open connection.
///
/// Dropping both halves closes the connection.
pub struct TransportStreams {
    /// Outbound text frames, client → server.
    pub outbound: mpsc::Sender<String>,
    /// Inbound events, server → client. Ends after `Closed`.
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Opens message-oriented connections to a target URL.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection and return its channel pair.
    async fn open(&self, url: &str) -> Result<TransportStreams, TransportError>;
}

/// Production transport over `tokio-tungstenite`.
///
/// Each open connection gets a read pump and a write pump task. Ping/Pong
/// is handled inside the WebSocket library; binary frames are ignored (the
/// protocol is text-only JSON).
#[derive(Clone, Debug)]
pub struct WsTransport {
    outbound_buffer: usize,
    inbound_buffer: usize,
}

impl WsTransport {
    /// A WebSocket transport with the given channel capacities.
    #[must_use]
    pub fn new(outbound_buffer: usize, inbound_buffer: usize) -> Self {
        Self {
            outbound_buffer: outbound_buffer.max(1),
            inbound_buffer: inbound_buffer.max(1),
        }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(32, 64)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<TransportStreams, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|error| TransportError::new(error.to_string()))?;
        let (mut write, mut read) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(self.outbound_buffer);
        let (inbound_tx, inbound_rx) = mpsc::channel::<TransportEvent>(self.inbound_buffer);

        // Write pump: forwards outbound frames until the sender drops, then
        // says goodbye with a Close frame.
        let _ = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(error) = write.send(Message::text(text)).await {
                    warn!(%error, "websocket write failed");
                    return;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        // Read pump: forwards inbound text frames and reports closure.
        let _ = tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        if inbound_tx
                            .send(TransportEvent::Message(text.to_string()))
                            .await
                            .is_err()
                        {
                            // Receiver dropped: the connection was abandoned.
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = inbound_tx.send(TransportEvent::Closed { reason }).await;
                        return;
                    }
                    Ok(other) => {
                        debug!(kind = ?other, "ignoring non-text frame");
                    }
                    Err(error) => {
                        let _ = inbound_tx
                            .send(TransportEvent::Closed {
                                reason: Some(error.to_string()),
                            })
                            .await;
                        return;
                    }
                }
            }
            let _ = inbound_tx.send(TransportEvent::Closed { reason: None }).await;
        });

        Ok(TransportStreams {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
