use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, EventStream, validate_events_for_append},
};

/// SQLSTATE for a SERIALIZABLE transaction that lost a race.
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for a primary-key clash on `(aggregate_id, sequence_number)`.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed event store implementation.
///
/// Appends run in a `SERIALIZABLE` transaction so two writers that observed
/// the same stream length cannot both commit.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let aggregate_id: String = row.try_get("aggregate_id")?;

        Ok(EventEnvelope {
            aggregate_id: aggregate_id.parse()?,
            version: Version::new(row.try_get("sequence_number")?),
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            timestamp: row.try_get("timestamp")?,
        })
    }

    /// Maps a failed statement inside an append to a conflict when Postgres
    /// reports a lost race, and to a plain store error otherwise.
    fn append_error(
        err: sqlx::Error,
        aggregate_id: AggregateId,
        expected: Version,
    ) -> EventStoreError {
        if let sqlx::Error::Database(ref db_err) = err
            && matches!(
                db_err.code().as_deref(),
                Some(SERIALIZATION_FAILURE) | Some(UNIQUE_VIOLATION)
            )
        {
            metrics::counter!("event_store_write_races_total").increment(1);
            return EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: expected.next(),
            };
        }
        EventStoreError::from(err)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.load_from(aggregate_id, Version::first()).await
    }

    async fn load_from(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT aggregate_id, sequence_number, event_type, payload, timestamp
            FROM events
            WHERE aggregate_id = $1 AND sequence_number >= $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id.to_string())
        .bind(from_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn append(
        &self,
        aggregate_id: AggregateId,
        expected: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        validate_events_for_append(aggregate_id, expected, &events)?;

        let conflict = |e| Self::append_error(e, aggregate_id, expected);

        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let current: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict)?;

        let actual = Version::new(current);
        if actual != expected {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            });
        }

        let mut last_version = expected;
        for event in &events {
            sqlx::query(
                r#"
                INSERT INTO events (aggregate_id, sequence_number, event_type, payload, timestamp)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(aggregate_id.to_string())
            .bind(event.version.as_i64())
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(conflict)?;

            last_version = event.version;
        }

        tx.commit().await.map_err(conflict)?;

        tracing::debug!(
            aggregate_id = %aggregate_id,
            version = %last_version,
            count = events.len(),
            "Appended events"
        );
        Ok(last_version)
    }

    async fn load_all(&self) -> Result<EventStream> {
        use futures_util::StreamExt;

        let stream = sqlx::query(
            r#"
            SELECT aggregate_id, sequence_number, event_type, payload, timestamp
            FROM events
            ORDER BY global_position ASC
            "#,
        )
        .fetch(&self.pool)
        .map(|result| match result {
            Ok(row) => Self::row_to_event(row),
            Err(e) => Err(EventStoreError::from(e)),
        });

        Ok(Box::pin(stream))
    }

    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        let version: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(Version::new(version))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, timestamp, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id) DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                version = EXCLUDED.version,
                timestamp = EXCLUDED.timestamp,
                state = EXCLUDED.state
            "#,
        )
        .bind(snapshot.aggregate_id.to_string())
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version.as_i64())
        .bind(snapshot.timestamp)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT aggregate_id, aggregate_type, version, timestamp, state
            FROM snapshots
            WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let id: String = row.try_get("aggregate_id")?;
                Ok(Some(Snapshot {
                    aggregate_id: id.parse()?,
                    aggregate_type: row.try_get("aggregate_type")?,
                    version: Version::new(row.try_get("version")?),
                    timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
                    state: row.try_get("state")?,
                }))
            }
            None => Ok(None),
        }
    }
}
