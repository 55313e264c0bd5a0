use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, EventStream, validate_events_for_append},
};

#[derive(Default)]
struct Log {
    /// Every event in commit order.
    events: Vec<EventEnvelope>,
    /// Positions in `events` per aggregate, in version order.
    streams: HashMap<AggregateId, Vec<usize>>,
}

/// In-memory event store implementation.
///
/// Provides the same guarantees as the PostgreSQL implementation: the version
/// check and the insertion happen under one write lock, so two appends with
/// the same expected version can never both succeed.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
    snapshots: Arc<RwLock<HashMap<AggregateId, Snapshot>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.load_from(aggregate_id, Version::first()).await
    }

    async fn load_from(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        let events = log
            .streams
            .get(&aggregate_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&pos| &log.events[pos])
                    .filter(|e| e.version >= from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }

    async fn append(
        &self,
        aggregate_id: AggregateId,
        expected: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        validate_events_for_append(aggregate_id, expected, &events)?;

        let mut log = self.log.write().await;

        let current = Version::new(
            log.streams
                .get(&aggregate_id)
                .map_or(0, |positions| positions.len() as i64),
        );
        if current != expected {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current,
            });
        }

        let last_version = expected.advance(events.len());
        let start = log.events.len();
        log.events.extend(events);
        let end = log.events.len();
        log.streams.entry(aggregate_id).or_default().extend(start..end);

        Ok(last_version)
    }

    async fn load_all(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.log.read().await.events.clone();
        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        let log = self.log.read().await;
        let count = log.streams.get(&aggregate_id).map_or(0, Vec::len);
        Ok(Version::initial().advance(count))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.aggregate_id, snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(&aggregate_id).cloned())
    }
}
