//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p event-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use event_store::{
    AggregateId, EventEnvelope, EventStore, EventStoreError, EventStoreExt, PostgresEventStore,
    Snapshot, Version,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_events_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresEventStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE events, snapshots")
        .execute(&pool)
        .await
        .unwrap();

    PostgresEventStore::new(pool)
}

fn create_test_event(aggregate_id: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
    EventEnvelope::new(
        aggregate_id,
        Version::new(version),
        event_type,
        serde_json::json!({"table_number": 5, "waiter": "w1"}),
    )
}

fn batch(aggregate_id: AggregateId, from: i64, to: i64) -> Vec<EventEnvelope> {
    (from..=to)
        .map(|v| create_test_event(aggregate_id, v, &format!("Event{v}")))
        .collect()
}

#[tokio::test]
async fn append_and_load_events() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    let result = store
        .append(aggregate_id, Version::initial(), batch(aggregate_id, 1, 1))
        .await;
    assert_eq!(result.unwrap(), Version::first());

    let events = store.load(aggregate_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].aggregate_id, aggregate_id);
    assert_eq!(events[0].event_type, "Event1");
    assert_eq!(events[0].version, Version::first());
    assert_eq!(
        events[0].payload,
        serde_json::json!({"table_number": 5, "waiter": "w1"})
    );
}

#[tokio::test]
async fn load_unknown_aggregate_is_empty() {
    let store = get_test_store().await;
    assert!(store.load(AggregateId::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn append_multiple_events_atomically() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    let result = store
        .append(aggregate_id, Version::initial(), batch(aggregate_id, 1, 3))
        .await;
    assert_eq!(result.unwrap(), Version::new(3));

    let stored = store.load(aggregate_id).await.unwrap();
    let versions: Vec<_> = stored.iter().map(|e| e.version.as_i64()).collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[tokio::test]
async fn optimistic_concurrency_conflict() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    store
        .append(aggregate_id, Version::initial(), batch(aggregate_id, 1, 1))
        .await
        .unwrap();

    let result = store
        .append(aggregate_id, Version::initial(), batch(aggregate_id, 1, 1))
        .await;

    assert!(matches!(
        result,
        Err(EventStoreError::ConcurrencyConflict { .. })
    ));
    assert_eq!(store.load(aggregate_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn optimistic_concurrency_success() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    store
        .append(aggregate_id, Version::initial(), batch(aggregate_id, 1, 1))
        .await
        .unwrap();
    store
        .append(aggregate_id, Version::first(), batch(aggregate_id, 2, 2))
        .await
        .unwrap();

    let version = store.aggregate_version(aggregate_id).await.unwrap();
    assert_eq!(version, Version::new(2));
}

#[tokio::test]
async fn concurrent_appends_exactly_one_wins() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    let mut handles = Vec::new();
    for writer in 0..5 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let events = vec![
                EventEnvelope::new(
                    aggregate_id,
                    Version::new(1),
                    "Written",
                    serde_json::json!({"writer": writer}),
                ),
                EventEnvelope::new(
                    aggregate_id,
                    Version::new(2),
                    "Written",
                    serde_json::json!({"writer": writer}),
                ),
            ];
            store.append(aggregate_id, Version::initial(), events).await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(version) => {
                assert_eq!(version, Version::new(2));
                wins += 1;
            }
            Err(EventStoreError::ConcurrencyConflict { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);

    // Never interleaved: both rows come from the same writer
    let stored = store.load(aggregate_id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].payload, stored[1].payload);
}

#[tokio::test]
async fn load_from_version() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    store
        .append(aggregate_id, Version::initial(), batch(aggregate_id, 1, 3))
        .await
        .unwrap();

    let from_v2 = store
        .load_from(aggregate_id, Version::new(2))
        .await
        .unwrap();

    assert_eq!(from_v2.len(), 2);
    assert_eq!(from_v2[0].version, Version::new(2));
    assert_eq!(from_v2[1].version, Version::new(3));
}

#[tokio::test]
async fn snapshot_save_and_retrieve() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    let snapshot = Snapshot::new(
        aggregate_id,
        "Tab",
        Version::new(5),
        serde_json::json!({"state": "saved"}),
    );

    store.save_snapshot(snapshot).await.unwrap();

    let retrieved = store.get_snapshot(aggregate_id).await.unwrap().unwrap();
    assert_eq!(retrieved.aggregate_id, aggregate_id);
    assert_eq!(retrieved.version, Version::new(5));
    assert_eq!(retrieved.state, serde_json::json!({"state": "saved"}));
}

#[tokio::test]
async fn snapshot_update_replaces_existing() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    for (version, state) in [(5, "first"), (10, "second")] {
        store
            .save_snapshot(Snapshot::new(
                aggregate_id,
                "Tab",
                Version::new(version),
                serde_json::json!({"state": state}),
            ))
            .await
            .unwrap();
    }

    let retrieved = store.get_snapshot(aggregate_id).await.unwrap().unwrap();
    assert_eq!(retrieved.version, Version::new(10));
    assert_eq!(retrieved.state, serde_json::json!({"state": "second"}));
}

#[tokio::test]
async fn snapshot_not_found() {
    let store = get_test_store().await;
    let result = store.get_snapshot(AggregateId::new()).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn load_all_follows_commit_order() {
    use futures_util::StreamExt;

    let store = get_test_store().await;
    let id1 = AggregateId::new();
    let id2 = AggregateId::new();

    store
        .append(id1, Version::initial(), batch(id1, 1, 1))
        .await
        .unwrap();
    store
        .append(id2, Version::initial(), batch(id2, 1, 1))
        .await
        .unwrap();
    store
        .append(id1, Version::first(), batch(id1, 2, 2))
        .await
        .unwrap();

    let events: Vec<_> = store
        .load_all()
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    let order: Vec<_> = events
        .iter()
        .map(|e| (e.aggregate_id, e.version.as_i64()))
        .collect();
    assert_eq!(order, vec![(id1, 1), (id2, 1), (id1, 2)]);
}

#[tokio::test]
async fn aggregate_exists_extension() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    assert!(!store.aggregate_exists(aggregate_id).await.unwrap());

    store
        .append(aggregate_id, Version::initial(), batch(aggregate_id, 1, 1))
        .await
        .unwrap();

    assert!(store.aggregate_exists(aggregate_id).await.unwrap());
}

#[tokio::test]
async fn load_aggregate_with_snapshot() {
    let store = get_test_store().await;
    let aggregate_id = AggregateId::new();

    store
        .append(aggregate_id, Version::initial(), batch(aggregate_id, 1, 3))
        .await
        .unwrap();

    store
        .save_snapshot(Snapshot::new(
            aggregate_id,
            "Tab",
            Version::new(2),
            serde_json::json!({"state": "at_v2"}),
        ))
        .await
        .unwrap();

    store
        .append(aggregate_id, Version::new(3), batch(aggregate_id, 4, 5))
        .await
        .unwrap();

    let (snapshot, events) = store.load_aggregate(aggregate_id).await.unwrap();
    assert_eq!(snapshot.unwrap().version, Version::new(2));
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].version, Version::new(3));
}

#[tokio::test]
async fn closed_pool_reports_unavailable() {
    let store = get_test_store().await;
    store.pool().close().await;

    let err = store.load(AggregateId::new()).await.unwrap_err();
    assert!(err.is_unavailable());
}
