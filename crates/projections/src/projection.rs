//! Core projection trait and position tracking.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// Tracks how many events a projection has applied.
///
/// Duplicates that a projection ignores do not move the position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    /// Number of events applied by this projection.
    pub events_processed: u64,
}

impl ProjectionPosition {
    /// Creates a new position at zero.
    pub fn zero() -> Self {
        Self {
            events_processed: 0,
        }
    }

    /// Advances the position by one event.
    pub fn advance(&self) -> Self {
        Self {
            events_processed: self.events_processed + 1,
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.events_processed)
    }
}

/// A projection that folds events into a read model.
///
/// `handle` must be idempotent: an envelope the projection has already
/// applied is accepted and ignored, because catch-up and live delivery may
/// overlap.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Handles a single event, updating the projection's read model.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    /// Returns the current position of this projection.
    async fn position(&self) -> ProjectionPosition;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}

#[async_trait]
impl<P: Projection + ?Sized> Projection for std::sync::Arc<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        (**self).handle(event).await
    }

    async fn position(&self) -> ProjectionPosition {
        (**self).position().await
    }

    async fn reset(&self) -> Result<()> {
        (**self).reset().await
    }
}
