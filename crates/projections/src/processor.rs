//! Projection processor for feeding stored events to projections.

use std::sync::Arc;

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;

use crate::Result;
use crate::projection::Projection;

/// Delivers events from an event store to projections.
///
/// The processor supports:
/// - Catch-up: replays the whole log in commit order
/// - Single event delivery: hands one envelope to every projection
/// - Rebuild: resets all projections and replays from scratch
///
/// Projections skip envelopes they have already applied, so catch-up can run
/// while live delivery is also feeding them.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Arc<dyn Projection>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    /// Creates a new processor with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams every stored event to every projection.
    ///
    /// Returns the number of events read from the store.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut stream = self.store.load_all().await?;
        let mut events_read: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            events_read += 1;
            self.process_event(&event).await?;
        }

        for projection in &self.projections {
            tracing::info!(
                projection = projection.name(),
                position = %projection.position().await,
                events_read,
                "catch-up complete"
            );
        }

        Ok(events_read)
    }

    /// Delivers a single event to all registered projections.
    #[tracing::instrument(
        skip(self, event),
        fields(event_type = %event.event_type, aggregate_id = %event.aggregate_id, version = %event.version)
    )]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
            metrics::counter!("projections_events_processed").increment(1);
        }
        Ok(())
    }

    /// Resets all projections and replays all events from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{InMemoryEventStore, Version};
    use tokio::sync::RwLock;

    use super::*;
    use crate::projection::ProjectionPosition;

    /// Counts distinct events, ignoring versions already seen.
    #[derive(Default)]
    struct CountingProjection {
        seen: RwLock<HashMap<AggregateId, Version>>,
        position: RwLock<ProjectionPosition>,
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<()> {
            let mut seen = self.seen.write().await;
            let last = seen.entry(event.aggregate_id).or_default();
            if event.version > *last {
                *last = event.version;
                let mut pos = self.position.write().await;
                *pos = pos.advance();
            }
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }

        async fn reset(&self) -> Result<()> {
            self.seen.write().await.clear();
            *self.position.write().await = ProjectionPosition::zero();
            Ok(())
        }
    }

    fn test_event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::new(
            aggregate_id,
            Version::new(version),
            "TestEvent",
            serde_json::json!({"test": true}),
        )
    }

    async fn store_with(events_per_aggregate: &[usize]) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        for &count in events_per_aggregate {
            let id = AggregateId::new();
            let events = (1..=count as i64).map(|v| test_event(id, v)).collect();
            store.append(id, Version::initial(), events).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn catch_up_processes_all_events() {
        let projection = Arc::new(CountingProjection::default());
        let mut processor = ProjectionProcessor::new(store_with(&[3, 2]).await);
        processor.register(projection.clone());

        assert_eq!(processor.run_catch_up().await.unwrap(), 5);
        assert_eq!(projection.position().await.events_processed, 5);
    }

    #[tokio::test]
    async fn repeated_catch_up_does_not_double_apply() {
        let projection = Arc::new(CountingProjection::default());
        let mut processor = ProjectionProcessor::new(store_with(&[3]).await);
        processor.register(projection.clone());

        processor.run_catch_up().await.unwrap();
        processor.run_catch_up().await.unwrap();
        assert_eq!(projection.position().await.events_processed, 3);
    }

    #[tokio::test]
    async fn rebuild_resets_and_replays() {
        let projection = Arc::new(CountingProjection::default());
        let mut processor = ProjectionProcessor::new(store_with(&[2]).await);
        processor.register(projection.clone());

        processor.run_catch_up().await.unwrap();
        processor.rebuild_all().await.unwrap();
        assert_eq!(projection.position().await.events_processed, 2);
    }

    #[tokio::test]
    async fn empty_store_catch_up() {
        let projection = Arc::new(CountingProjection::default());
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(projection.clone());

        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
        assert_eq!(projection.position().await, ProjectionPosition::zero());
    }

    #[tokio::test]
    async fn process_event_reaches_every_projection() {
        let first = Arc::new(CountingProjection::default());
        let second = Arc::new(CountingProjection::default());
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(first.clone());
        processor.register(second.clone());
        assert_eq!(processor.projection_count(), 2);

        processor
            .process_event(&test_event(AggregateId::new(), 1))
            .await
            .unwrap();

        assert_eq!(first.position().await.events_processed, 1);
        assert_eq!(second.position().await.events_processed, 1);
    }
}
