//! Connection handle and receive half

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::{ClientId, ConnectionError, MessageSink, MessageStream, SendError};

/// Whether a connection still accepts messages, and why it stopped
#[derive(Debug, Clone)]
enum LinkState {
    Open,
    /// Closed locally with [`Connection::close`]
    Closed,
    /// The writer gave up after the transport failed
    Failed(ConnectionError),
}

impl LinkState {
    fn is_open(&self) -> bool {
        matches!(self, LinkState::Open)
    }

    fn error(&self) -> ConnectionError {
        match self {
            LinkState::Failed(e) => e.clone(),
            LinkState::Open | LinkState::Closed => ConnectionError::Closed,
        }
    }
}

/// Shared handle for a single live connection
///
/// Messages are queued on a bounded channel and written to the transport by
/// a dedicated writer task, so a slow peer only ever blocks the tasks that
/// send to it.
pub struct Connection {
    id: ClientId,
    sender: mpsc::Sender<String>,
    state: Arc<watch::Sender<LinkState>>,
    connected_at: DateTime<Utc>,
    /// Last inbound message (Unix milliseconds)
    last_activity: AtomicI64,
}

/// Point-in-time view of one connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub client_id: ClientId,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Connection {
    /// Wrap an accepted sink and spawn its writer task.
    ///
    /// `buffer` is the number of outbound messages that may queue before
    /// `send` starts waiting.
    pub fn open<S: MessageSink>(
        id: ClientId,
        sink: S,
        buffer: usize,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let (state, _) = watch::channel(LinkState::Open);
        let state = Arc::new(state);
        let now = Utc::now();

        let writer = tokio::spawn(write_loop(id, sink, receiver, state.clone()));

        let connection = Arc::new(Self {
            id,
            sender,
            state,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp_millis()),
        });

        (connection, writer)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        !self.state.borrow().is_open()
    }

    /// Queue one message for the peer
    pub async fn send(&self, text: impl Into<String>) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        self.sender
            .send(text.into())
            .await
            .map_err(|_| SendError::Closed)
    }

    /// Queue one message, giving up if the peer's queue stays full for `limit`
    pub async fn send_timeout(
        &self,
        text: impl Into<String>,
        limit: Duration,
    ) -> Result<(), SendError> {
        match timeout(limit, self.send(text)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout(limit)),
        }
    }

    /// Close the connection.
    ///
    /// Stops the writer, which then closes the transport. Returns `true` only
    /// for the call that actually performed the close.
    pub fn close(&self) -> bool {
        let closed = self.state.send_if_modified(|state| {
            if !state.is_open() {
                return false;
            }
            *state = LinkState::Closed;
            true
        });
        if closed {
            tracing::debug!(client_id = %self.id, "Connection closed");
        }
        closed
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity.load(Ordering::Relaxed))
            .unwrap_or(self.connected_at)
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            client_id: self.id,
            connected_at: self.connected_at,
            last_activity: self.last_activity(),
        }
    }

    fn touch(&self) {
        self.last_activity
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn state_signal(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Receive half of a connection, driven by the connection's own task
pub struct Inbound<St> {
    stream: St,
    connection: Arc<Connection>,
    state: watch::Receiver<LinkState>,
}

impl<St: MessageStream> Inbound<St> {
    pub fn new(stream: St, connection: Arc<Connection>) -> Self {
        let state = connection.state_signal();
        Self {
            stream,
            connection,
            state,
        }
    }

    /// Wait for the next message from the peer.
    ///
    /// Fails as soon as the connection stops, even while the peer is silent:
    /// with `ConnectionError::Closed` after a local close, or with the
    /// writer's error if sending to the peer failed.
    pub async fn receive(&mut self) -> Result<String, ConnectionError> {
        let text = tokio::select! {
            biased;
            error = wait_stopped(&mut self.state) => return Err(error),
            result = self.stream.recv_text() => result?,
        };
        self.connection.touch();
        Ok(text)
    }
}

async fn wait_stopped(state: &mut watch::Receiver<LinkState>) -> ConnectionError {
    match state.wait_for(|state| !state.is_open()).await {
        Ok(state) => state.error(),
        // Sender gone, the connection no longer exists
        Err(_) => ConnectionError::Closed,
    }
}

/// Drain the outbound queue into the sink until closed or the sink fails
async fn write_loop<S: MessageSink>(
    id: ClientId,
    mut sink: S,
    mut receiver: mpsc::Receiver<String>,
    state: Arc<watch::Sender<LinkState>>,
) {
    let mut state_rx = state.subscribe();

    loop {
        let text = tokio::select! {
            biased;
            _ = wait_stopped(&mut state_rx) => break,
            message = receiver.recv() => match message {
                Some(text) => text,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = wait_stopped(&mut state_rx) => break,
            result = sink.send_text(text) => {
                if let Err(e) = result {
                    tracing::debug!(client_id = %id, error = %e, "Write failed, stopping writer");
                    state.send_if_modified(|state| {
                        if !state.is_open() {
                            return false;
                        }
                        *state = LinkState::Failed(e);
                        true
                    });
                    break;
                }
            }
        }
    }

    state.send_if_modified(|state| {
        if !state.is_open() {
            return false;
        }
        *state = LinkState::Closed;
        true
    });
    receiver.close();

    if let Err(e) = sink.close().await {
        tracing::debug!(client_id = %id, error = %e, "Failed to close transport");
    }
}
