use prometheus::{Encoder, TextEncoder};

use super::*;

/// Encode every registered metric in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn set_active(count: usize) {
        CONNECTIONS_ACTIVE.set(count as i64);
    }

    pub fn record_opened() {
        CONNECTIONS_OPENED.inc();
    }

    pub fn record_closed(reason: &str, duration_secs: f64) {
        CONNECTIONS_CLOSED.with_label_values(&[reason]).inc();
        CONNECTION_DURATION.observe(duration_secs);
    }

    pub fn record_handshake_failed() {
        HANDSHAKES_FAILED.inc();
    }
}

pub struct MessageMetrics;

impl MessageMetrics {
    pub fn record_received() {
        MESSAGES_RECEIVED.inc();
    }

    pub fn record_broadcast() {
        BROADCASTS_TOTAL.inc();
    }

    pub fn record_delivered(count: u64) {
        MESSAGES_DELIVERED.inc_by(count);
    }

    pub fn record_failed(count: u64) {
        MESSAGES_FAILED.inc_by(count);
    }
}
