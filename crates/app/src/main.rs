//! Bar tab system entry point.

use app::{BarSystem, Config};
use tokio::signal;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    app::telemetry::init(&config).expect("failed to initialise telemetry");

    let system = BarSystem::connect(&config)
        .await
        .expect("failed to start bar system");

    let tables = system.open_tabs().active_table_numbers().await;
    tracing::info!(open_tabs = tables.len(), ?tables, "bar system ready");

    shutdown_signal().await;
    system.shutdown().await;

    tracing::info!("shut down gracefully");
}
