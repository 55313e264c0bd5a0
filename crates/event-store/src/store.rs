use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version};

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Core trait for event store implementations.
///
/// An event store is an append-only log partitioned by aggregate. Each
/// aggregate's events carry contiguous versions starting at 1.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Retrieves all events for an aggregate, oldest first.
    ///
    /// Returns an empty vector if the aggregate has never been written.
    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Retrieves the events of an aggregate starting at `from_version`
    /// (inclusive). Used to replay the tail after a snapshot.
    async fn load_from(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Appends events to an aggregate's stream.
    ///
    /// Succeeds only if the stream currently ends at `expected`. The batch is
    /// written atomically: either every event lands or none does. On a
    /// mismatch the store returns `ConcurrencyConflict` and writes nothing.
    ///
    /// Returns the version of the last appended event.
    async fn append(
        &self,
        aggregate_id: AggregateId,
        expected: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version>;

    /// Streams every event in the store in global commit order.
    async fn load_all(&self) -> Result<EventStream>;

    /// Gets the current version of an aggregate, `Version::initial()` if it
    /// has no events.
    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Version>;

    /// Saves a snapshot of an aggregate's state.
    ///
    /// If a snapshot already exists for this aggregate, it is replaced.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Retrieves the latest snapshot for an aggregate.
    ///
    /// Returns None if no snapshot exists.
    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

#[async_trait]
impl<S: EventStore + ?Sized> EventStore for Arc<S> {
    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        (**self).load(aggregate_id).await
    }

    async fn load_from(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        (**self).load_from(aggregate_id, from_version).await
    }

    async fn append(
        &self,
        aggregate_id: AggregateId,
        expected: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        (**self).append(aggregate_id, expected, events).await
    }

    async fn load_all(&self) -> Result<EventStream> {
        (**self).load_all().await
    }

    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        (**self).aggregate_version(aggregate_id).await
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        (**self).save_snapshot(snapshot).await
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        (**self).get_snapshot(aggregate_id).await
    }
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Checks if an aggregate exists (has any events).
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.aggregate_version(aggregate_id).await? > Version::initial())
    }

    /// Loads an aggregate's events, starting from its snapshot if one exists.
    ///
    /// If a snapshot exists, returns the snapshot and events after it.
    /// Otherwise, returns None and all events.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(aggregate_id).await? {
            let events = self
                .load_from(aggregate_id, snapshot.version.next())
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.load(aggregate_id).await?;
            Ok((None, events))
        }
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks a batch before it reaches storage.
///
/// The batch must be non-empty, target `aggregate_id` only, and carry the
/// versions `expected + 1 ..= expected + len` in order.
pub fn validate_events_for_append(
    aggregate_id: AggregateId,
    expected: Version,
    events: &[EventEnvelope],
) -> Result<()> {
    let invalid = |reason: String| EventStoreError::InvalidAppend {
        aggregate_id,
        reason,
    };

    if events.is_empty() {
        return Err(invalid("cannot append an empty event list".to_string()));
    }

    let mut version = expected;
    for event in events {
        if event.aggregate_id != aggregate_id {
            return Err(invalid(format!(
                "event belongs to aggregate {}",
                event.aggregate_id
            )));
        }
        version = version.next();
        if event.version != version {
            return Err(invalid(format!(
                "event versions must be sequential, expected {version}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}
