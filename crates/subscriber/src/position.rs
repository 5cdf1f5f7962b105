//! Durable position tracking for a category subscriber. Three
//! implementations share one interface; the embedder picks the one that
//! fits its durability/performance tradeoff.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use sqlx::PgPool;

use ea_domain::error::Result;
use ea_store::EventStore;

/// `{get(id) -> position, update(id, position)}`.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn get(&self, subscriber_id: &str) -> Result<i64>;
    async fn update(&self, subscriber_id: &str, position: i64) -> Result<()>;
}

/// Volatile; resets to 0 on restart. Intended for tests and short-lived
/// embedders that don't need resumability.
#[derive(Default)]
pub struct InMemoryPositionStore {
    positions: Mutex<HashMap<String, i64>>,
}

impl InMemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn get(&self, subscriber_id: &str) -> Result<i64> {
        Ok(*self.positions.lock().get(subscriber_id).unwrap_or(&0))
    }

    async fn update(&self, subscriber_id: &str, position: i64) -> Result<()> {
        self.positions.lock().insert(subscriber_id.to_string(), position);
        Ok(())
    }
}

/// Stores each position update as a `PositionUpdated` event on a dedicated
/// stream `subscriberPosition-<id>`. Full audit trail of every advance, at
/// the cost of an append per batch.
pub struct EventLogPositionStore {
    store: EventStore,
}

impl EventLogPositionStore {
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }

    fn stream_name(subscriber_id: &str) -> String {
        format!("subscriberPosition-{subscriber_id}")
    }
}

#[async_trait]
impl PositionStore for EventLogPositionStore {
    async fn get(&self, subscriber_id: &str) -> Result<i64> {
        let stream = Self::stream_name(subscriber_id);
        match self.store.last_stream_message(&stream).await? {
            Some(event) => Ok(event
                .data
                .get("position")
                .and_then(|v| v.as_i64())
                .unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn update(&self, subscriber_id: &str, position: i64) -> Result<()> {
        let stream = Self::stream_name(subscriber_id);
        self.store
            .append(
                &stream,
                "PositionUpdated",
                json!({"subscriber_id": subscriber_id, "position": position}),
                None,
                None,
            )
            .await?;
        Ok(())
    }
}

/// Upserts into a `subscriber_positions(subscriber_id PRIMARY KEY, position
/// BIGINT, updated_at TIMESTAMP)` table. No history, fastest of the three;
/// the table is created on first use.
pub struct TablePositionStore {
    pool: PgPool,
    ensured: Arc<Mutex<bool>>,
}

impl TablePositionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ensured: Arc::new(Mutex::new(false)),
        }
    }

    async fn ensure_table(&self) -> Result<()> {
        if *self.ensured.lock() {
            return Ok(());
        }
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS subscriber_positions (\
               subscriber_id TEXT PRIMARY KEY, \
               position BIGINT NOT NULL, \
               updated_at TIMESTAMPTZ NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ea_domain::error::Error::EventStoreTransport(e.to_string()))?;
        *self.ensured.lock() = true;
        Ok(())
    }
}

#[async_trait]
impl PositionStore for TablePositionStore {
    async fn get(&self, subscriber_id: &str) -> Result<i64> {
        self.ensure_table().await?;
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT position FROM subscriber_positions WHERE subscriber_id = $1",
        )
        .bind(subscriber_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ea_domain::error::Error::EventStoreTransport(e.to_string()))?;
        Ok(row.map(|(p,)| p).unwrap_or(0))
    }

    async fn update(&self, subscriber_id: &str, position: i64) -> Result<()> {
        self.ensure_table().await?;
        sqlx::query(
            "INSERT INTO subscriber_positions (subscriber_id, position, updated_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (subscriber_id) DO UPDATE SET position = $2, updated_at = $3",
        )
        .bind(subscriber_id)
        .bind(position)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| ea_domain::error::Error::EventStoreTransport(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_defaults_to_zero_and_tracks_updates() {
        let store = InMemoryPositionStore::new();
        assert_eq!(store.get("sub-a").await.unwrap(), 0);
        store.update("sub-a", 42).await.unwrap();
        assert_eq!(store.get("sub-a").await.unwrap(), 42);
        assert_eq!(store.get("sub-b").await.unwrap(), 0);
    }
}
