//! Connection lifecycle and fan-out.
//!
//! Each connection runs `CONNECTING → REGISTERED → CLOSED` inside
//! [`Hub::connect`]:
//! 1. the transport handshake completes (`accept`)
//! 2. the connection is added to the registry
//! 3. every received message is echoed to its author, then broadcast
//! 4. on any exit the connection is removed and a departure notice is broadcast

mod message;
mod registration;

pub use message::ChatMessage;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::WebSocketConfig;
use crate::connection::{
    ClientId, ClientIdGenerator, Connection, ConnectionError, Inbound, SendError, Upgrade,
};
use crate::metrics::{ConnectionMetrics, MessageMetrics};
use crate::registry::{BroadcastReport, Registry, RegistryOptions};

use registration::{announce_departure, Registration};

/// Reserved ids kept for clients that have not connected yet; the oldest
/// reservation is dropped beyond this
const MAX_RESERVED_IDS: usize = 1024;

/// Hub tuning
#[derive(Debug, Clone, Copy)]
pub struct HubOptions {
    /// Outbound messages queued per connection before senders wait
    pub outbound_buffer: usize,
    pub registry: RegistryOptions,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            outbound_buffer: 32,
            registry: RegistryOptions::default(),
        }
    }
}

impl From<&WebSocketConfig> for HubOptions {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            outbound_buffer: config.outbound_buffer,
            registry: RegistryOptions {
                send_timeout: Duration::from_millis(config.send_timeout_ms),
                max_concurrent_sends: config.max_concurrent_sends,
            },
        }
    }
}

/// Owns the registry and drives every connection through its lifecycle
pub struct Hub {
    registry: Arc<Registry>,
    ids: ClientIdGenerator,
    reserved: Mutex<VecDeque<ClientId>>,
    outbound_buffer: usize,
}

impl Hub {
    pub fn new(options: HubOptions) -> Self {
        Self {
            registry: Arc::new(Registry::with_options(options.registry)),
            ids: ClientIdGenerator::new(),
            reserved: Mutex::new(VecDeque::new()),
            outbound_buffer: options.outbound_buffer,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Next collision-free client id
    pub fn issue_client_id(&self) -> ClientId {
        self.ids.next_id()
    }

    /// Issue an id ahead of the connection, e.g. for the chat page to show.
    ///
    /// The client presents it when connecting; see [`Hub::claim_client_id`].
    pub fn reserve_client_id(&self) -> ClientId {
        let id = self.ids.next_id();
        let mut reserved = self.reserved.lock();
        if reserved.len() >= MAX_RESERVED_IDS {
            reserved.pop_front();
        }
        reserved.push_back(id);
        id
    }

    /// Take a reserved id. Each reservation can be claimed once; unknown or
    /// expired ids return `None`.
    pub fn claim_client_id(&self, id: ClientId) -> Option<ClientId> {
        let mut reserved = self.reserved.lock();
        let position = reserved.iter().position(|candidate| *candidate == id)?;
        reserved.remove(position)
    }

    /// Run one connection from handshake to cleanup.
    ///
    /// Returns once the connection is closed. Clean closes (peer close frame,
    /// local close) return `Ok`; a failed handshake or transport error is
    /// returned after cleanup. A handshake failure never registers anything.
    #[tracing::instrument(name = "hub.connect", skip_all, fields(client_id = %client_id))]
    pub async fn connect<U: Upgrade>(
        &self,
        client_id: ClientId,
        upgrade: U,
    ) -> Result<(), ConnectionError> {
        let (sink, stream) = match upgrade.accept().await {
            Ok(halves) => halves,
            Err(e) => {
                self.handshake_failed(client_id, &e);
                return Err(e);
            }
        };

        let started = Instant::now();
        let (connection, _writer) = Connection::open(client_id, sink, self.outbound_buffer);
        let registration = Registration::register(self.registry.clone(), connection.clone());
        ConnectionMetrics::record_opened();

        let mut inbound = Inbound::new(stream, connection.clone());
        let outcome = loop {
            match inbound.receive().await {
                Ok(text) => self.handle_message(&connection, &text).await,
                Err(e) => break e,
            }
        };

        if outcome.is_clean() {
            tracing::info!(reason = outcome.reason(), "Client disconnected");
        } else {
            tracing::warn!(error = %outcome, "Connection failed");
        }

        registration.release().await;

        let duration = started.elapsed().as_secs_f64();
        ConnectionMetrics::record_closed(outcome.reason(), duration);
        tracing::debug!(duration_secs = duration, "Connection lifecycle finished");

        if outcome.is_clean() {
            Ok(())
        } else {
            Err(outcome)
        }
    }

    /// Record an upgrade that failed before reaching the hub
    pub fn handshake_failed(&self, client_id: ClientId, error: &ConnectionError) {
        ConnectionMetrics::record_handshake_failed();
        tracing::warn!(
            client_id = %client_id,
            error = %error,
            "Handshake failed, connection discarded"
        );
    }

    async fn handle_message(&self, connection: &Arc<Connection>, payload: &str) {
        MessageMetrics::record_received();

        let echo = ChatMessage::Echo { payload }.to_string();
        if let Err(e) = self.registry.send_to(connection, &echo).await {
            tracing::debug!(client_id = %connection.id(), error = %e, "Failed to echo message");
        }

        let announcement = ChatMessage::Said {
            client_id: connection.id(),
            payload,
        }
        .to_string();
        self.registry.broadcast(&announcement).await;
    }

    /// Remove a client, close it and tell everyone else it left.
    ///
    /// Returns `false` if the client was not registered.
    pub async fn disconnect(&self, client_id: ClientId) -> bool {
        let Some(connection) = self.registry.remove_id(client_id) else {
            return false;
        };
        connection.close();
        announce_departure(&self.registry, client_id).await;
        true
    }

    /// Send `message` to every registered client
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        self.registry.broadcast(message).await
    }

    /// Send `message` to one registered client
    pub async fn send_personal_message(
        &self,
        client_id: ClientId,
        message: &str,
    ) -> Result<(), SendError> {
        self.registry.send_to_id(client_id, message).await
    }

    /// Close every registered connection; their tasks then clean up.
    pub fn close_all(&self) -> usize {
        let closed = self.registry.close_all();
        tracing::info!(closed, "Closed all connections");
        closed
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubOptions::default())
    }
}
