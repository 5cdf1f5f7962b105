//! The event log client (§4.A): a pooled connection to a Message
//! DB-compatible Postgres event store, exposing append-with-optimistic-
//! concurrency, ordered stream reads, category reads, and O(1) last-message
//! lookup.
//!
//! The store crate only *calls* the server-side SQL functions
//! (`write_message`, `get_stream_messages`, `get_category_messages`,
//! `get_last_stream_message`); it does not install them. A Message
//! DB-compatible extension is assumed to already be present on the target
//! database (see SPEC_FULL.md §4.A and §6).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use ea_domain::config::EventStoreConfig;
use ea_domain::error::{Error, Result};
use ea_domain::event::Event;

/// Consumer-group partitioning parameters for a category read. Both fields
/// are required together — a bare `member` or bare `size` is meaningless.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerGroup {
    pub member: i64,
    pub size: i64,
}

/// Optional narrowing parameters for [`EventStore::read_category`].
#[derive(Debug, Clone, Default)]
pub struct CategoryReadOptions {
    pub consumer_group: Option<ConsumerGroup>,
    pub correlation: Option<String>,
    pub condition: Option<String>,
}

/// A pooled client over the event log. Cheap to clone (wraps an `Arc`-backed
/// `sqlx::PgPool` internally) and safe to share across concurrent callers.
#[derive(Clone)]
pub struct EventStore {
    pool: PgPool,
}

impl EventStore {
    /// Opens a bounded connection pool. Connection errors propagate as
    /// [`Error::EventStoreTransport`].
    pub async fn connect(config: &EventStoreConfig) -> Result<Self> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .min_connections(config.pool_min)
            .max_connections(config.pool_max)
            .connect(&config.connection_string())
            .await
            .map_err(|e| Error::EventStoreTransport(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wrap an already-constructed pool (useful for tests against a shared
    /// pool, or for embedders that manage the pool's lifecycle themselves).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Release the pool's connections. Safe to call even if callers still
    /// hold clones of this store; those calls will then fail with a
    /// transport error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Append one event. If `expected_version` is supplied, the write
    /// succeeds only if the stream's last position equals it;
    /// `expected_version = -1` requires the stream to be empty. Returns the
    /// new event's stream position.
    pub async fn append(
        &self,
        stream: &str,
        event_type: &str,
        data: Value,
        metadata: Option<Value>,
        expected_version: Option<i64>,
    ) -> Result<i64> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            "SELECT write_message($1::varchar, $2::varchar, $3::varchar, $4::jsonb, $5::jsonb, $6::bigint)",
        )
        .bind(id.to_string())
        .bind(stream)
        .bind(event_type)
        .bind(&data)
        .bind(&metadata)
        .bind(expected_version)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.try_get::<i64, _>(0).unwrap_or(0)),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("Wrong expected version") => {
                Err(Error::OptimisticConcurrency {
                    stream: stream.to_string(),
                    expected_version: expected_version.unwrap_or(-1),
                    actual_version: parse_actual_version(db_err.message()),
                })
            }
            Err(e) => Err(Error::EventStoreTransport(e.to_string())),
        }
    }

    /// Read up to `batch_size` events of `stream`, in position order,
    /// starting at `from_position`. Empty if the stream does not exist.
    pub async fn read_stream(
        &self,
        stream: &str,
        from_position: i64,
        batch_size: i64,
    ) -> Result<Vec<Event>> {
        let rows = sqlx::query("SELECT * FROM get_stream_messages($1, $2, $3)")
            .bind(stream)
            .bind(from_position)
            .bind(batch_size)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::EventStoreTransport(e.to_string()))?;
        rows.iter().map(row_to_event).collect()
    }

    /// O(1) lookup of the event with the greatest position on `stream`.
    pub async fn last_stream_message(&self, stream: &str) -> Result<Option<Event>> {
        let row = sqlx::query("SELECT * FROM get_last_stream_message($1)")
            .bind(stream)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::EventStoreTransport(e.to_string()))?;
        row.as_ref().map(row_to_event).transpose()
    }

    /// Read up to `batch_size` events across all streams in `category`, in
    /// global-position order, with optional consumer-group partitioning,
    /// correlation narrowing, and server-side condition filtering.
    ///
    /// `condition` is rejected loudly (rather than silently ignored) when
    /// the server does not support it — see SPEC_FULL.md's Open Question
    /// on `condition`.
    pub async fn read_category(
        &self,
        category: &str,
        from_global_position: i64,
        batch_size: i64,
        options: CategoryReadOptions,
    ) -> Result<Vec<Event>> {
        let (member, size) = match options.consumer_group {
            Some(cg) => (Some(cg.member), Some(cg.size)),
            None => (None, None),
        };

        let rows = sqlx::query(
            "SELECT * FROM get_category_messages($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(category)
        .bind(from_global_position)
        .bind(batch_size)
        .bind(&options.correlation)
        .bind(member)
        .bind(size)
        .bind(&options.condition)
        .fetch_all(&self.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(sqlx::Error::Database(db_err))
                if options.condition.is_some()
                    && db_err.message().to_lowercase().contains("condition") =>
            {
                return Err(Error::Config(format!(
                    "server-side condition filtering is not enabled: {}",
                    db_err.message()
                )));
            }
            Err(e) => return Err(Error::EventStoreTransport(e.to_string())),
        };
        rows.iter().map(row_to_event).collect()
    }

    /// Verifies connectivity and that `write_message` is installed.
    pub async fn health_check(&self) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM pg_proc WHERE proname = 'write_message') AS present",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::EventStoreTransport(e.to_string()))?;
        Ok(row.try_get::<bool, _>("present").unwrap_or(false))
    }
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<Event> {
    let id: String = row
        .try_get("id")
        .map_err(|e| Error::EventStoreTransport(e.to_string()))?;
    let id = Uuid::parse_str(&id).map_err(|e| Error::EventStoreTransport(e.to_string()))?;
    let stream_name: String = row
        .try_get("stream_name")
        .map_err(|e| Error::EventStoreTransport(e.to_string()))?;
    let event_type: String = row
        .try_get("type")
        .map_err(|e| Error::EventStoreTransport(e.to_string()))?;
    let position: i64 = row
        .try_get("position")
        .map_err(|e| Error::EventStoreTransport(e.to_string()))?;
    let global_position: i64 = row
        .try_get("global_position")
        .map_err(|e| Error::EventStoreTransport(e.to_string()))?;
    let time: DateTime<Utc> = row
        .try_get("time")
        .map_err(|e| Error::EventStoreTransport(e.to_string()))?;
    let data: Value = row
        .try_get("data")
        .map_err(|e| Error::EventStoreTransport(e.to_string()))?;
    let metadata: Option<Value> = row
        .try_get("metadata")
        .map_err(|e| Error::EventStoreTransport(e.to_string()))?;

    Ok(Event {
        id,
        stream_name,
        event_type,
        position,
        global_position,
        time,
        data,
        metadata,
    })
}

/// Best-effort extraction of the actual stream version from a Message
/// DB "Wrong expected version" error, e.g. `"... Stream Version: 5)"`.
fn parse_actual_version(message: &str) -> Option<i64> {
    let marker = "Stream Version:";
    let idx = message.find(marker)?;
    let tail = &message[idx + marker.len()..];
    let digits: String = tail
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
