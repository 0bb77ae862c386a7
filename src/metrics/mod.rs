//! Prometheus metrics for the chat hub.
//!
//! - Connection metrics (active connections, opened/closed, durations)
//! - Message metrics (received, broadcasts, deliveries, failures)

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, MessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "chat_hub";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of registered connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of registered WebSocket connections"
    ).unwrap();

    pub static ref CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total connections that completed the handshake"
    ).unwrap();

    /// Closed connections by reason (disconnected, closed, transport_error)
    pub static ref CONNECTIONS_CLOSED: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_closed_total", METRIC_PREFIX),
        "Total closed connections",
        &["reason"]
    ).unwrap();

    pub static ref HANDSHAKES_FAILED: IntCounter = register_int_counter!(
        format!("{}_handshakes_failed_total", METRIC_PREFIX),
        "Total upgrade attempts that failed the handshake"
    ).unwrap();

    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "Connection lifetime in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    pub static ref MESSAGES_RECEIVED: IntCounter = register_int_counter!(
        format!("{}_messages_received_total", METRIC_PREFIX),
        "Total messages received from clients"
    ).unwrap();

    pub static ref BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Total broadcasts started"
    ).unwrap();

    pub static ref MESSAGES_DELIVERED: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Total messages queued to a connection"
    ).unwrap();

    pub static ref MESSAGES_FAILED: IntCounter = register_int_counter!(
        format!("{}_messages_failed_total", METRIC_PREFIX),
        "Total messages that could not be queued to a connection"
    ).unwrap();
}
