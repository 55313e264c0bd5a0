//! Process wiring for the bar tab system.
//!
//! Builds the event store, event bus, command dispatcher and open tabs view
//! from [`Config`], and brings the view up to date before any command is
//! accepted.

pub mod config;
pub mod error;
pub mod telemetry;

use std::sync::Arc;

use domain::{CommandDispatcher, TabService};
use event_bus::{EventBus, InMemoryEventBus, Subscription};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use projections::{OpenTabsView, ProjectionProcessor, ProjectionSubscriber};
use sqlx::postgres::PgPoolOptions;

pub use config::{Config, InvalidSetting, LogFormat};
pub use error::{AppError, Result};

/// Event store shared by the write side and read-side catch-up.
pub type SharedStore = Arc<dyn EventStore>;

/// Tab service over the shared store and the in-process bus.
pub type BarService = TabService<SharedStore, InMemoryEventBus>;

/// A running bar: the write side and the open tabs view, connected by the bus.
pub struct BarSystem {
    store: SharedStore,
    bus: InMemoryEventBus,
    service: BarService,
    open_tabs: OpenTabsView,
    subscription: Subscription,
}

impl BarSystem {
    /// Opens the store named by `config` and starts the system on it.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = open_store(config).await?;
        Self::start(store, config).await
    }

    /// Starts the system on an existing store.
    ///
    /// The view is subscribed before catch-up runs, so events committed while
    /// the log is being replayed are not missed. Anything seen twice is
    /// skipped by the view.
    #[tracing::instrument(skip_all)]
    pub async fn start(store: SharedStore, config: &Config) -> Result<Self> {
        let bus = InMemoryEventBus::new();
        let open_tabs = OpenTabsView::new();

        let subscriber =
            ProjectionSubscriber::new(Arc::new(open_tabs.clone())).with_gap_fill(store.clone());
        let subscription = bus.subscribe(Arc::new(subscriber)).await;

        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Arc::new(open_tabs.clone()));
        let replayed = processor.run_catch_up().await?;
        metrics::counter!("catch_up_events_total").increment(replayed);
        tracing::info!(replayed, "open tabs view caught up");

        let dispatcher =
            CommandDispatcher::with_config(store.clone(), bus.clone(), config.dispatcher_config());
        let service = TabService::with_retry(dispatcher, config.retry_policy());

        Ok(Self {
            store,
            bus,
            service,
            open_tabs,
            subscription,
        })
    }

    pub fn service(&self) -> &BarService {
        &self.service
    }

    pub fn open_tabs(&self) -> &OpenTabsView {
        &self.open_tabs
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Live delivery progress of the open tabs view.
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Stops live delivery once already-published events are handled.
    pub async fn shutdown(&self) {
        self.bus.shutdown().await;
        tracing::info!(
            delivered = self.subscription.delivered(),
            "event bus shut down"
        );
    }
}

async fn open_store(config: &Config) -> Result<SharedStore> {
    let Some(url) = &config.database_url else {
        tracing::info!("DATABASE_URL not set, keeping events in memory");
        return Ok(Arc::new(InMemoryEventStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await?;
    let store = PostgresEventStore::new(pool);
    store.run_migrations().await?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "connected to PostgreSQL event store"
    );

    Ok(Arc::new(store))
}
