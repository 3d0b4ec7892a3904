//! Relay channels carrying signaling messages between the two peers

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

/// Outbound half of an ordered, reliable message pipe.
///
/// Inbound text arrives on the receiver handed out next to the channel.
#[async_trait]
pub trait SignalChannel: Send + Sync {
    async fn send(&self, text: String) -> Result<()>;
}

/// Inbound text frames, in the order the remote sent them
pub type SignalStream = mpsc::UnboundedReceiver<String>;

/// Signaling over a WebSocket relay
pub struct WebSocketChannel {
    outbound: mpsc::UnboundedSender<String>,
}

impl WebSocketChannel {
    pub async fn connect(url: &str) -> Result<(Self, SignalStream)> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| Error::TransportError(format!("cannot connect to {}: {}", url, e)))?;
        info!("WebSocket connection established: {}", url);

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    warn!("WebSocket send failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("WebSocket writer finished");
        });

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!("dropping non UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(WsMessage::Close(_)) => {
                        info!("WebSocket connection closed");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                };
                if inbound_tx.send(text).is_err() {
                    break;
                }
            }
        });

        Ok((
            Self {
                outbound: outbound_tx,
            },
            inbound_rx,
        ))
    }
}

#[async_trait]
impl SignalChannel for WebSocketChannel {
    async fn send(&self, text: String) -> Result<()> {
        self.outbound
            .send(text)
            .map_err(|_| Error::TransportError("signaling socket is closed".into()))
    }
}

/// In-process channel; one end of a [`MemoryChannel::pair`]
pub struct MemoryChannel {
    peer: mpsc::UnboundedSender<String>,
}

impl MemoryChannel {
    /// Two connected ends, each with the stream of what the other sends
    pub fn pair() -> ((Self, SignalStream), (Self, SignalStream)) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        ((Self { peer: b_tx }, a_rx), (Self { peer: a_tx }, b_rx))
    }
}

#[async_trait]
impl SignalChannel for MemoryChannel {
    async fn send(&self, text: String) -> Result<()> {
        self.peer
            .send(text)
            .map_err(|_| Error::TransportError("peer end is gone".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_delivers_in_order() {
        let ((a, mut a_inbox), (b, mut b_inbox)) = MemoryChannel::pair();
        a.send("one".into()).await.unwrap();
        a.send("two".into()).await.unwrap();
        b.send("back".into()).await.unwrap();

        assert_eq!(b_inbox.recv().await.as_deref(), Some("one"));
        assert_eq!(b_inbox.recv().await.as_deref(), Some("two"));
        assert_eq!(a_inbox.recv().await.as_deref(), Some("back"));
    }

    #[tokio::test]
    async fn test_send_to_dropped_peer_is_transport_error() {
        let ((a, _a_inbox), (_b, b_inbox)) = MemoryChannel::pair();
        drop(b_inbox);
        assert!(matches!(
            a.send("lost".into()).await,
            Err(Error::TransportError(_))
        ));
    }

    #[tokio::test]
    async fn test_websocket_connect_failure() {
        let result = WebSocketChannel::connect("ws://127.0.0.1:1").await;
        assert!(matches!(result, Err(Error::TransportError(_))));
    }
}
