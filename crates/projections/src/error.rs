//! Projection error types.

use common::AggregateId;
use event_store::Version;
use thiserror::Error;

/// Errors that can occur during projection processing and queries.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// No open tab is assigned to the table.
    #[error("No open tab for table {0}")]
    NoTabForTable(u32),

    /// An event arrived for a tab the view has never seen opened.
    #[error("Unknown tab {0}")]
    UnknownTab(AggregateId),

    /// An event arrived ahead of one it depends on. It was not applied.
    #[error("Sequence gap for aggregate {aggregate_id}: expected version {expected}, received {received}")]
    SequenceGap {
        aggregate_id: AggregateId,
        expected: Version,
        received: Version,
    },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
