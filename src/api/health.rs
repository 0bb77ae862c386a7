//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection::ConnectionInfo;
use crate::registry::RegistryStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: state.hub.registry().len(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.hub.registry().stats())
}

/// Live connections with their connect time and last inbound activity
pub async fn connections(State(state): State<AppState>) -> Json<Vec<ConnectionInfo>> {
    Json(state.hub.registry().connections())
}
