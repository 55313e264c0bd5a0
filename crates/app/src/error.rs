//! Start-up and wiring errors.

use event_bus::EventBusError;
use event_store::EventStoreError;
use projections::ProjectionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Could not connect to the database: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error("Open tabs view could not catch up: {0}")]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    EventBus(#[from] EventBusError),

    #[error("Logging is already initialised: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("Could not start the metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

pub type Result<T> = std::result::Result<T, AppError>;
