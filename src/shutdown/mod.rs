//! Graceful shutdown of the hub.
//!
//! Closing a connection wakes its task, which unregisters it and broadcasts
//! the departure notice as usual. Shutdown closes every connection and then
//! waits, bounded by a timeout, for the registry to drain.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::hub::Hub;

/// Polling interval while waiting for the registry to drain
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handles graceful shutdown of the hub
pub struct GracefulShutdown {
    hub: Arc<Hub>,
    drain_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(hub: Arc<Hub>, drain_timeout: Duration) -> Self {
        Self { hub, drain_timeout }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.hub.registry().len())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = Instant::now();
        let registry = self.hub.registry();
        let initial = registry.len();

        tracing::info!(reason = %reason, connections = initial, "Closing all connections");
        self.hub.close_all();

        let drained = timeout(self.drain_timeout, async {
            while !registry.is_empty() {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok();

        let remaining = registry.len();
        if !drained {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not close in time"
            );
        }

        let result = ShutdownResult {
            connections_closed: initial.saturating_sub(remaining),
            remaining,
            drained,
            duration: start.elapsed(),
        };

        tracing::info!(
            connections_closed = result.connections_closed,
            remaining = result.remaining,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }
}

/// Result of a graceful shutdown
#[derive(Debug, Clone)]
pub struct ShutdownResult {
    pub connections_closed: usize,
    pub remaining: usize,
    /// Whether the registry emptied before the timeout
    pub drained: bool,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let hub = Arc::new(Hub::default());
        let shutdown = GracefulShutdown::new(hub, Duration::from_secs(1));

        let result = shutdown.execute("test shutdown").await;

        assert!(result.drained);
        assert_eq!(result.connections_closed, 0);
        assert_eq!(result.remaining, 0);
    }
}
