use async_trait::async_trait;

use super::ConnectionError;

/// Write half of a transport, owned by the connection's writer task
#[async_trait]
pub trait MessageSink: Send + 'static {
    /// Write one text message to the peer
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError>;

    /// Close the transport. Called once, after the last write.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Read half of a transport, owned by the connection's receive loop
#[async_trait]
pub trait MessageStream: Send + 'static {
    /// Wait for the next text message.
    ///
    /// Returns `ConnectionError::Disconnected` when the peer closes cleanly
    /// and `ConnectionError::Transport` on abrupt failure.
    async fn recv_text(&mut self) -> Result<String, ConnectionError>;
}

/// A pending connection whose protocol handshake has not completed yet
#[async_trait]
pub trait Upgrade: Send + 'static {
    type Sink: MessageSink;
    type Stream: MessageStream;

    /// Complete the handshake and split the transport into its halves
    async fn accept(self) -> Result<(Self::Sink, Self::Stream), ConnectionError>;
}
