//! Scoped registry membership for one connection task

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::connection::{ClientId, Connection};
use crate::registry::Registry;

use super::ChatMessage;

/// Keeps a connection registered for as long as it is alive.
///
/// `release` performs the normal exit: unregister, close, announce the
/// departure. If the owning task is cancelled or panics first, `Drop` does
/// the same, spawning the announcement on the current runtime.
pub(crate) struct Registration {
    registry: Arc<Registry>,
    connection: Arc<Connection>,
    active: bool,
}

impl Registration {
    pub fn register(registry: Arc<Registry>, connection: Arc<Connection>) -> Self {
        registry.add(connection.clone());
        Self {
            registry,
            connection,
            active: true,
        }
    }

    pub async fn release(mut self) {
        self.active = false;
        let removed = self.registry.remove(&self.connection);
        self.connection.close();

        if removed {
            announce_departure(&self.registry, self.connection.id()).await;
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.active {
            return;
        }

        let client_id = self.connection.id();
        self.connection.close();
        if !self.registry.remove(&self.connection) {
            return;
        }

        tracing::info!(
            client_id = %client_id,
            "Connection task ended early, registration released"
        );

        match Handle::try_current() {
            Ok(handle) => {
                let registry = self.registry.clone();
                handle.spawn(async move {
                    announce_departure(&registry, client_id).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    client_id = %client_id,
                    "No runtime available, departure notice dropped"
                );
            }
        }
    }
}

pub(crate) async fn announce_departure(registry: &Registry, client_id: ClientId) {
    let notice = ChatMessage::Left { client_id }.to_string();
    let report = registry.broadcast(&notice).await;
    tracing::debug!(
        client_id = %client_id,
        delivered = report.delivered,
        failed = report.failed,
        "Departure announced"
    );
}
