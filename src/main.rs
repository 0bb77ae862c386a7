use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use chat_hub::config::Settings;
use chat_hub::server::{create_app, AppState};
use chat_hub::shutdown::GracefulShutdown;
use chat_hub::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(&settings.logging);
    tracing::info!("Configuration loaded");

    // Create application state
    let state = AppState::new(settings.clone());
    tracing::info!("Application state initialized");

    // Close open connections as soon as shutdown starts; the HTTP server
    // drains in parallel
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let graceful = GracefulShutdown::new(
        state.hub.clone(),
        Duration::from_secs(settings.websocket.shutdown_timeout_secs),
    );
    let hub_handle = tokio::spawn(async move {
        if shutdown_rx.recv().await.is_ok() {
            graceful.execute("server shutting down").await;
        }
    });

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    // Wait for the hub to finish closing connections
    tracing::info!("Waiting for connections to close...");
    let _ = hub_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Close WebSocket connections
    let _ = shutdown_tx.send(());
}
