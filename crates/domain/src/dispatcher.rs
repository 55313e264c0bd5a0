//! Command dispatching: load, replay, handle, persist, publish.

use std::future::Future;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use common::AggregateId;
use event_bus::EventBus;
use event_store::{EventEnvelope, EventStore, EventStoreExt, Snapshot, Version};

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::{DispatchError, DispatchStage};
use crate::tab::TabAggregate;

/// Trait for commands that target a single aggregate.
pub trait Command: Send + Sync {
    /// Returns the ID of the aggregate this command targets.
    fn aggregate_id(&self) -> AggregateId;

    /// Returns the command name used in logs and metrics.
    fn command_type(&self) -> &'static str;
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Limit on each event store call.
    pub store_timeout: Duration,

    /// Limit on each publish.
    pub publish_timeout: Duration,

    /// Save a snapshot every this many events. `None` disables snapshots.
    pub snapshot_every: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(2),
            snapshot_every: None,
        }
    }
}

/// Result of a successful dispatch.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated, persisted and published.
    pub events: Vec<A::Event>,

    /// The version of the last stored event.
    pub new_version: Version,
}

/// Runs one command end to end against one aggregate.
///
/// The dispatcher never retries. A `ConcurrencyConflict` goes back to the
/// caller, which decides whether to dispatch again.
pub struct CommandDispatcher<S, B, A = TabAggregate>
where
    S: EventStore,
    B: EventBus,
    A: SnapshotCapable,
{
    store: S,
    bus: B,
    config: DispatcherConfig,
    _phantom: PhantomData<A>,
}

impl<S, B, A> CommandDispatcher<S, B, A>
where
    S: EventStore,
    B: EventBus,
    A: SnapshotCapable,
    A::Command: Command,
{
    pub fn new(store: S, bus: B) -> Self {
        Self::with_config(store, bus, DispatcherConfig::default())
    }

    pub fn with_config(store: S, bus: B, config: DispatcherConfig) -> Self {
        Self {
            store,
            bus,
            config,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Dispatches a command.
    ///
    /// A rejected command writes and publishes nothing. Events are only
    /// published once the append has been confirmed.
    #[tracing::instrument(
        skip(self, command),
        fields(aggregate_id = %command.aggregate_id(), command_type = command.command_type())
    )]
    pub async fn dispatch(
        &self,
        command: A::Command,
    ) -> Result<CommandResult<A>, DispatchError<A::Error>> {
        let command_type = command.command_type();
        metrics::counter!("commands_dispatched_total", "command_type" => command_type)
            .increment(1);
        let started = Instant::now();

        let result = self.run(command).await;

        metrics::histogram!("command_duration_seconds", "command_type" => command_type)
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok(outcome) => tracing::debug!(
                version = %outcome.new_version,
                events = outcome.events.len(),
                "Command dispatched"
            ),
            Err(DispatchError::Rejected(e)) => {
                metrics::counter!("commands_rejected_total", "command_type" => command_type)
                    .increment(1);
                tracing::debug!(error = %e, "Command rejected");
            }
            Err(e @ DispatchError::ConcurrencyConflict { .. }) => {
                metrics::counter!("concurrency_conflicts_total").increment(1);
                tracing::debug!(error = %e, "Command lost a write race");
            }
            Err(e) => tracing::warn!(error = %e, "Command dispatch failed"),
        }
        result
    }

    /// Loads and replays the aggregate without dispatching anything.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DispatchError<A::Error>> {
        let (snapshot, envelopes) = if self.config.snapshot_every.is_some() {
            self.store_call(DispatchStage::Load, self.store.load_aggregate(aggregate_id))
                .await?
        } else {
            let events = self
                .store_call(DispatchStage::Load, self.store.load(aggregate_id))
                .await?;
            (None, events)
        };

        let mut aggregate = match snapshot {
            Some(snapshot) => restore::<A>(aggregate_id, snapshot)?,
            None => A::default(),
        };

        for envelope in envelopes {
            let corrupt = |reason: String| DispatchError::CorruptHistory {
                aggregate_id,
                version: envelope.version,
                reason,
            };

            let expected = aggregate.version().next();
            if envelope.version != expected {
                return Err(corrupt(format!("expected version {expected}")));
            }
            let event: A::Event = envelope
                .decode()
                .map_err(|e| corrupt(format!("cannot decode {}: {e}", envelope.event_type)))?;
            if event.aggregate_id() != aggregate_id {
                return Err(corrupt(format!(
                    "event belongs to aggregate {}",
                    event.aggregate_id()
                )));
            }

            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    async fn run(
        &self,
        command: A::Command,
    ) -> Result<CommandResult<A>, DispatchError<A::Error>> {
        let aggregate_id = command.aggregate_id();
        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = aggregate
            .handle(&command)
            .map_err(DispatchError::Rejected)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events,
                new_version: current_version,
            });
        }

        let envelopes = build_envelopes::<A>(aggregate_id, current_version, &events)?;

        let new_version = self
            .store_call(
                DispatchStage::Append,
                self.store.append(aggregate_id, current_version, envelopes.clone()),
            )
            .await?;
        metrics::counter!("events_appended_total").increment(envelopes.len() as u64);

        for event in &events {
            aggregate.apply(event.clone());
        }
        aggregate.set_version(new_version);

        self.maybe_snapshot(aggregate_id, &aggregate).await;
        self.publish(&envelopes, new_version).await?;

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    /// Publishes every envelope in order.
    ///
    /// All envelopes are offered to the bus even if one fails; the first
    /// failure is reported.
    async fn publish(
        &self,
        envelopes: &[EventEnvelope],
        committed_version: Version,
    ) -> Result<(), DispatchError<A::Error>> {
        let mut first_error: Option<DispatchError<A::Error>> = None;

        for envelope in envelopes {
            let outcome =
                tokio::time::timeout(self.config.publish_timeout, self.bus.publish(envelope))
                    .await;
            let error = match outcome {
                Ok(Ok(())) => {
                    metrics::counter!("events_published_total").increment(1);
                    continue;
                }
                Ok(Err(source)) => DispatchError::PublishFailed {
                    committed_version,
                    source,
                },
                Err(_) => DispatchError::Timeout {
                    stage: DispatchStage::Publish,
                },
            };
            tracing::warn!(
                event_type = %envelope.event_type,
                version = %envelope.version,
                error = %error,
                "Committed event not published"
            );
            if first_error.is_none() {
                first_error = Some(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Saves a snapshot when one is due. Failures are logged only.
    async fn maybe_snapshot(&self, aggregate_id: AggregateId, aggregate: &A) {
        let Some(interval) = self.config.snapshot_every else {
            return;
        };
        if !aggregate.should_snapshot(interval) {
            return;
        }

        let snapshot = match Snapshot::from_state(
            aggregate_id,
            A::aggregate_type(),
            aggregate.version(),
            aggregate,
        ) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize snapshot");
                return;
            }
        };

        let saved = tokio::time::timeout(
            self.config.store_timeout,
            self.store.save_snapshot(snapshot),
        )
        .await;
        match saved {
            Ok(Ok(())) => tracing::debug!(version = %aggregate.version(), "Snapshot saved"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to save snapshot"),
            Err(_) => tracing::warn!("Timed out saving snapshot"),
        }
    }

    async fn store_call<T>(
        &self,
        stage: DispatchStage,
        call: impl Future<Output = event_store::Result<T>>,
    ) -> Result<T, DispatchError<A::Error>> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result.map_err(DispatchError::from_store),
            Err(_) => Err(DispatchError::Timeout { stage }),
        }
    }
}

fn restore<A: SnapshotCapable>(
    aggregate_id: AggregateId,
    snapshot: Snapshot,
) -> Result<A, DispatchError<A::Error>> {
    let version = snapshot.version;
    let mut aggregate: A = snapshot
        .into_state()
        .map_err(|e| DispatchError::CorruptHistory {
            aggregate_id,
            version,
            reason: format!("unreadable snapshot: {e}"),
        })?;
    aggregate.set_version(version);
    Ok(aggregate)
}

fn build_envelopes<A: Aggregate>(
    aggregate_id: AggregateId,
    current_version: Version,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DispatchError<A::Error>> {
    let mut envelopes = Vec::with_capacity(events.len());
    let mut version = current_version;

    for event in events {
        version = version.next();
        let envelope = EventEnvelope::encode(aggregate_id, version, event)
            .map_err(|e| DispatchError::Store(e.into()))?;
        envelopes.push(envelope);
    }

    Ok(envelopes)
}
