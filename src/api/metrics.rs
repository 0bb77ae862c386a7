use axum::http::header;
use axum::response::IntoResponse;

use crate::error::{AppError, Result};
use crate::metrics::encode_metrics;

/// Prometheus scrape endpoint
pub async fn prometheus_metrics() -> Result<impl IntoResponse> {
    let body = encode_metrics()
        .map_err(|e| AppError::Internal(format!("Failed to encode metrics: {}", e)))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
