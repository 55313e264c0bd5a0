//! Dispatch error types.

use common::AggregateId;
use event_bus::EventBusError;
use event_store::{EventStoreError, Version};
use thiserror::Error;

use crate::tab::{MenuError, TabError};

/// Step of a dispatch that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Load,
    Append,
    Publish,
}

impl std::fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            DispatchStage::Load => "load",
            DispatchStage::Append => "append",
            DispatchStage::Publish => "publish",
        };
        f.write_str(stage)
    }
}

/// Errors returned by `CommandDispatcher::dispatch`.
///
/// `E` is the aggregate's rejection type.
#[derive(Debug, Error)]
pub enum DispatchError<E = TabError> {
    /// The aggregate rejected the command. Nothing was written.
    #[error("Command rejected: {0}")]
    Rejected(E),

    /// Another writer appended to the aggregate first. Nothing was written.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The event store could not be reached.
    #[error("Event store unavailable: {0}")]
    StoreUnavailable(#[source] EventStoreError),

    /// Any other event store failure.
    #[error("Event store error: {0}")]
    Store(#[source] EventStoreError),

    /// Stored history for the aggregate cannot be replayed.
    #[error("Corrupt history for aggregate {aggregate_id} at version {version}: {reason}")]
    CorruptHistory {
        aggregate_id: AggregateId,
        version: Version,
        reason: String,
    },

    #[error("Timed out during {stage}")]
    Timeout { stage: DispatchStage },

    /// Events were appended but not handed to every subscriber.
    #[error("Events committed at version {committed_version} but not published: {source}")]
    PublishFailed {
        committed_version: Version,
        #[source]
        source: EventBusError,
    },
}

impl<E> DispatchError<E> {
    /// Maps a store failure, splitting out conflicts and outages.
    pub fn from_store(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => DispatchError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            },
            err if err.is_unavailable() => DispatchError::StoreUnavailable(err),
            err => DispatchError::Store(err),
        }
    }

    /// True if dispatching the same command again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::ConcurrencyConflict { .. })
    }

    /// True if the events were durably stored even though an error is
    /// returned.
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            DispatchError::PublishFailed { .. }
                | DispatchError::Timeout {
                    stage: DispatchStage::Publish
                }
        )
    }

    /// Returns the rejection if the aggregate refused the command.
    pub fn rejection(&self) -> Option<&E> {
        match self {
            DispatchError::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors from service operations that consult the menu before dispatching.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Menu(#[from] MenuError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
