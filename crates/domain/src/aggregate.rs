//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name, as stored next to the payload.
    fn event_type(&self) -> &'static str;

    /// Returns the aggregate the event belongs to.
    fn aggregate_id(&self) -> AggregateId;
}

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate is rebuilt by folding its events in log order, validates
/// commands against that state, and answers each command with new events or
/// a rejection. Neither `apply` nor `handle` touches the outside world.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of commands this aggregate accepts.
    type Command;

    /// The type of errors returned when a command is rejected.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the version of the last applied event, 0 for a new aggregate.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    ///
    /// Called by the dispatcher after applying each stored event.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Must be deterministic: the same state and event always produce the
    /// same new state. Events are facts, so applying one cannot fail.
    fn apply(&mut self, event: Self::Event);

    /// Decides what a command means for the current state.
    ///
    /// Returns the events to record, or the reason the command is rejected.
    /// An empty vector means the command changes nothing.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Builds an aggregate from scratch by folding `events`.
    fn replay(events: impl IntoIterator<Item = Self::Event>) -> Self {
        let mut aggregate = Self::default();
        let mut version = Version::initial();
        for event in events {
            aggregate.apply(event);
            version = version.next();
        }
        aggregate.set_version(version);
        aggregate
    }
}

/// Trait for aggregates that support snapshotting.
///
/// The state is periodically serialized so loading can start from it rather
/// than from the first event.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Returns whether a snapshot is due at the current version, given the
    /// configured interval in events.
    fn should_snapshot(&self, interval: u64) -> bool {
        let version = self.version().as_i64();
        interval > 0 && version > 0 && (version as u64).is_multiple_of(interval)
    }
}
