//! Pluggable socket transport.
//!
//! The manager only ever sees a [`Link`]: a sender for outbound text frames
//! and a receiver of inbound [`LinkEvent`]s. Dropping the outbound sender
//! closes the socket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::error::{ErrorCode, Result, VigilError};

/// Something that happened on an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame
    Message(String),
    /// The peer closed the socket
    Closed,
    /// The socket failed
    Error(String),
}

/// An open socket, as channels.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens links to a URL.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Link>;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<Link> {
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                VigilError::with_internal(
                    ErrorCode::Timeout,
                    "WebSocket connect timed out",
                    url.to_string(),
                )
            })??;

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        // Writer: runs until the manager drops its sender.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: runs until the socket closes or the manager stops listening.
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => LinkEvent::Message(text),
                    Ok(Message::Close(_)) => LinkEvent::Closed,
                    Ok(Message::Binary(_)) => {
                        debug!("Ignoring binary WebSocket frame");
                        continue;
                    }
                    Ok(_) => continue,
                    Err(e) => LinkEvent::Error(e.to_string()),
                };

                let terminal = !matches!(event, LinkEvent::Message(_));
                if inbound_tx.send(event).is_err() || terminal {
                    return;
                }
            }
            let _ = inbound_tx.send(LinkEvent::Closed);
        });

        debug!(url = %url, "WebSocket opened");
        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
