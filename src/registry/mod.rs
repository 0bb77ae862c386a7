//! Process-wide set of live connections.
//!
//! Every mutation and every snapshot is a single short critical section on
//! one lock. Sends happen on a snapshot taken under the lock, never while
//! holding it, so a slow peer cannot stall registrations or removals.

mod stats;

pub use stats::{BroadcastReport, RegistryStats};

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;

use crate::connection::{ClientId, Connection, ConnectionInfo, SendError};
use crate::metrics::{ConnectionMetrics, MessageMetrics};

use stats::RegistryCounters;

/// Delivery limits applied to registry sends
#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    /// Upper bound for a single send to a single connection
    pub send_timeout: Duration,
    /// Maximum sends in flight during one broadcast
    pub max_concurrent_sends: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(5000),
            max_concurrent_sends: 100,
        }
    }
}

/// Shared registry of live connections, keyed by client id
pub struct Registry {
    members: RwLock<HashMap<ClientId, Arc<Connection>>>,
    options: RegistryOptions,
    counters: RegistryCounters,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_options(RegistryOptions::default())
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
            options,
            counters: RegistryCounters::default(),
        }
    }

    /// Register a connection.
    ///
    /// # Panics
    ///
    /// Panics if a connection with the same client id is already registered.
    pub fn add(&self, connection: Arc<Connection>) {
        let id = connection.id();
        let members = {
            let mut members = self.members.write();
            assert!(
                !members.contains_key(&id),
                "client #{} registered twice",
                id
            );
            members.insert(id, connection);
            members.len()
        };

        self.counters.total_added.fetch_add(1, Ordering::Relaxed);
        ConnectionMetrics::set_active(members);

        tracing::info!(client_id = %id, members, "Connection registered");
    }

    /// Unregister a connection.
    ///
    /// Only the exact instance is removed; returns `false` if it was not
    /// registered.
    pub fn remove(&self, connection: &Arc<Connection>) -> bool {
        let id = connection.id();
        let members = {
            let mut members = self.members.write();
            match members.get(&id) {
                Some(current) if Arc::ptr_eq(current, connection) => {
                    members.remove(&id);
                    members.len()
                }
                _ => return false,
            }
        };

        self.counters.total_removed.fetch_add(1, Ordering::Relaxed);
        ConnectionMetrics::set_active(members);

        tracing::info!(client_id = %id, members, "Connection unregistered");
        true
    }

    /// Unregister whatever connection currently holds `id`
    pub fn remove_id(&self, id: ClientId) -> Option<Arc<Connection>> {
        let connection = self.get(id)?;
        self.remove(&connection).then_some(connection)
    }

    pub fn get(&self, id: ClientId) -> Option<Arc<Connection>> {
        self.members.read().get(&id).cloned()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.members.read().contains_key(&id)
    }

    fn is_registered(&self, connection: &Arc<Connection>) -> bool {
        self.members
            .read()
            .get(&connection.id())
            .is_some_and(|current| Arc::ptr_eq(current, connection))
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Current members, taken in one critical section
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.members.read().values().cloned().collect()
    }

    /// Per-connection details, ordered by client id
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut connections: Vec<_> = self.snapshot().iter().map(|c| c.info()).collect();
        connections.sort_by_key(|info| info.client_id);
        connections
    }

    /// Send `message` to every member of a snapshot taken now.
    ///
    /// Failed sends are logged and counted; they never abort delivery to
    /// the remaining recipients.
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        let recipients = self.snapshot();
        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        MessageMetrics::record_broadcast();

        if recipients.is_empty() {
            return BroadcastReport::default();
        }

        let (delivered, failed) = self.send_to_all(&recipients, message).await;

        self.counters
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.counters.failed.fetch_add(failed as u64, Ordering::Relaxed);
        MessageMetrics::record_delivered(delivered as u64);
        MessageMetrics::record_failed(failed as u64);

        tracing::debug!(
            recipients = recipients.len(),
            delivered,
            failed,
            "Broadcast completed"
        );

        BroadcastReport {
            recipients: recipients.len(),
            delivered,
            failed,
        }
    }

    /// Send `message` to one registered connection
    pub async fn send_to(
        &self,
        connection: &Arc<Connection>,
        message: &str,
    ) -> Result<(), SendError> {
        if !self.is_registered(connection) {
            return Err(SendError::NotRegistered(connection.id()));
        }
        self.deliver(connection, message).await
    }

    /// Send `message` to the connection registered under `id`
    pub async fn send_to_id(&self, id: ClientId, message: &str) -> Result<(), SendError> {
        let connection = self.get(id).ok_or(SendError::NotRegistered(id))?;
        self.deliver(&connection, message).await
    }

    async fn deliver(&self, connection: &Arc<Connection>, message: &str) -> Result<(), SendError> {
        let result = connection
            .send_timeout(message, self.options.send_timeout)
            .await;
        match result {
            Ok(()) => MessageMetrics::record_delivered(1),
            Err(_) => MessageMetrics::record_failed(1),
        }
        result
    }

    /// Close every registered connection. Returns how many were open.
    pub fn close_all(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|connection| connection.close())
            .count()
    }

    pub fn stats(&self) -> RegistryStats {
        self.counters.snapshot(self.len())
    }

    async fn send_to_all(&self, recipients: &[Arc<Connection>], message: &str) -> (usize, usize) {
        let limit = self.options.send_timeout;
        let max_in_flight = self.options.max_concurrent_sends.max(1);
        let mut futures = FuturesUnordered::new();
        let mut delivered = 0;
        let mut failed = 0;

        let mut tally = |id: ClientId, result: Result<(), SendError>| match result {
            Ok(()) => delivered += 1,
            Err(e) => {
                failed += 1;
                tracing::debug!(client_id = %id, error = %e, "Broadcast send failed");
            }
        };

        for connection in recipients {
            futures.push(async move {
                let result = connection.send_timeout(message, limit).await;
                (connection.id(), result)
            });

            if futures.len() >= max_in_flight {
                if let Some((id, result)) = futures.next().await {
                    tally(id, result);
                }
            }
        }

        while let Some((id, result)) = futures.next().await {
            tally(id, result);
        }

        (delivered, failed)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
