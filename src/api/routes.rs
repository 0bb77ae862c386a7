use axum::{routing::get, Router};

use crate::server::AppState;

use super::health::{connections, health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/connections", get(connections))
        .route("/metrics", get(prometheus_metrics))
}
