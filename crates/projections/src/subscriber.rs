//! Bus adapter that feeds live events into a projection.

use std::sync::Arc;

use async_trait::async_trait;
use event_bus::{EventHandler, HandlerError};
use event_store::{EventEnvelope, EventStore};

use crate::error::ProjectionError;
use crate::projection::Projection;

/// Subscribes a projection to an event bus.
///
/// Events for one aggregate can be published out of order when two commands
/// on it commit close together. With a store attached, a `SequenceGap` is
/// filled by loading the missing events from the store; the late envelope is
/// then ignored as a duplicate when it arrives.
pub struct ProjectionSubscriber {
    projection: Arc<dyn Projection>,
    store: Option<Arc<dyn EventStore>>,
}

impl ProjectionSubscriber {
    pub fn new(projection: Arc<dyn Projection>) -> Self {
        Self {
            projection,
            store: None,
        }
    }

    /// Fills sequence gaps from `store`.
    pub fn with_gap_fill(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    async fn fill_gap(
        &self,
        store: &dyn EventStore,
        event: &EventEnvelope,
        gap: ProjectionError,
    ) -> Result<(), ProjectionError> {
        let ProjectionError::SequenceGap {
            aggregate_id,
            expected,
            received,
        } = gap
        else {
            return Err(gap);
        };

        tracing::debug!(
            projection = self.projection.name(),
            aggregate_id = %aggregate_id,
            expected = %expected,
            received = %received,
            "Filling sequence gap from the event store"
        );
        metrics::counter!("projection_gap_fills_total").increment(1);

        let missing = store.load_from(aggregate_id, expected).await?;
        for envelope in missing.iter().take_while(|e| e.version <= event.version) {
            self.projection.handle(envelope).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ProjectionSubscriber {
    fn name(&self) -> &str {
        self.projection.name()
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        let result = match (self.projection.handle(event).await, &self.store) {
            (Err(gap @ ProjectionError::SequenceGap { .. }), Some(store)) => {
                self.fill_gap(store.as_ref(), event, gap).await
            }
            (result, _) => result,
        };
        result.map_err(HandlerError::new)
    }
}
