//! In-process transport.
//!
//! [`pair`] returns the server side ([`MemoryUpgrade`]) and the client side
//! ([`MemoryPeer`]) of one connection. The peer can send text, close cleanly
//! with an optional close code, or abort with a transport error. Useful for
//! driving the hub without a network.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ConnectionError, MessageSink, MessageStream, Upgrade};

/// Frames travelling from the peer to the server
#[derive(Debug)]
enum Frame {
    Text(String),
    Close(Option<u16>),
    Abort(String),
}

/// Create a connected server/peer pair
pub fn pair() -> (MemoryUpgrade, MemoryPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let upgrade = MemoryUpgrade {
        inbound: inbound_rx,
        outbound: outbound_tx,
        reject: None,
    };
    let peer = MemoryPeer {
        inbound: inbound_tx,
        outbound: outbound_rx,
    };

    (upgrade, peer)
}

/// Server side of a pending in-memory connection
pub struct MemoryUpgrade {
    inbound: mpsc::UnboundedReceiver<Frame>,
    outbound: mpsc::UnboundedSender<String>,
    reject: Option<String>,
}

impl MemoryUpgrade {
    /// Make `accept` fail with a handshake error
    pub fn reject(mut self, reason: impl Into<String>) -> Self {
        self.reject = Some(reason.into());
        self
    }
}

#[async_trait]
impl Upgrade for MemoryUpgrade {
    type Sink = MemorySink;
    type Stream = MemoryStream;

    async fn accept(self) -> Result<(MemorySink, MemoryStream), ConnectionError> {
        if let Some(reason) = self.reject {
            return Err(ConnectionError::Handshake(reason));
        }

        Ok((
            MemorySink {
                outbound: Some(self.outbound),
            },
            MemoryStream {
                inbound: self.inbound,
            },
        ))
    }
}

pub struct MemorySink {
    outbound: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        let outbound = self.outbound.as_ref().ok_or(ConnectionError::Closed)?;
        outbound
            .send(text)
            .map_err(|_| ConnectionError::Transport("peer dropped".to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.outbound.take();
        Ok(())
    }
}

pub struct MemoryStream {
    inbound: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl MessageStream for MemoryStream {
    async fn recv_text(&mut self) -> Result<String, ConnectionError> {
        match self.inbound.recv().await {
            Some(Frame::Text(text)) => Ok(text),
            Some(Frame::Close(code)) => Err(ConnectionError::Disconnected { code }),
            Some(Frame::Abort(reason)) => Err(ConnectionError::Transport(reason)),
            // Peer handle dropped without a close frame
            None => Err(ConnectionError::Disconnected { code: None }),
        }
    }
}

/// Client side of an in-memory connection
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<Frame>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Send a text message to the server. Returns false once the server side is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.inbound.send(Frame::Text(text.into())).is_ok()
    }

    /// Close cleanly, as a WebSocket close frame would
    pub fn close(&self, code: Option<u16>) {
        let _ = self.inbound.send(Frame::Close(code));
    }

    /// Fail the transport abruptly
    pub fn abort(&self, reason: impl Into<String>) {
        let _ = self.inbound.send(Frame::Abort(reason.into()));
    }

    /// Next message from the server, or `None` once the server closed the transport
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Next message if one is already waiting
    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejected_upgrade() {
        let (upgrade, _peer) = pair();
        let result = upgrade.reject("bad protocol").accept().await;
        assert!(matches!(
            result,
            Err(ConnectionError::Handshake(reason)) if reason == "bad protocol"
        ));
    }

    #[tokio::test]
    async fn test_dropped_peer_reads_as_disconnect() {
        let (upgrade, peer) = pair();
        let (_sink, mut stream) = upgrade.accept().await.unwrap();
        drop(peer);

        assert_eq!(
            stream.recv_text().await,
            Err(ConnectionError::Disconnected { code: None })
        );
    }

    #[tokio::test]
    async fn test_sink_close_ends_peer_stream() {
        let (upgrade, mut peer) = pair();
        let (mut sink, _stream) = upgrade.accept().await.unwrap();

        sink.send_text("bye".to_string()).await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(peer.recv().await.as_deref(), Some("bye"));
        assert_eq!(peer.recv().await, None);
        assert_eq!(
            sink.send_text("again".to_string()).await,
            Err(ConnectionError::Closed)
        );
    }
}
