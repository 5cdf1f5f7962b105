//! A subscriber polls a category from a durable position, dispatching a
//! handler to each event it reads and advancing its position after each
//! event succeeds. A handler error halts the batch at the failing event:
//! position is not advanced past it, so the same event is retried on the
//! next poll. This deviates from the upstream at-least-once-but-can-lose
//! behaviour (see DESIGN.md's resolution of the subscriber open question).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ea_domain::error::Result;
use ea_domain::event::Event;
use ea_store::{CategoryReadOptions, EventStore};

use crate::position::PositionStore;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// `{category, handler, batch_size, poll_interval, subscriber_id,
/// position_store}`.
pub struct Subscriber {
    store: EventStore,
    category: String,
    handler: Handler,
    batch_size: i64,
    poll_interval: Duration,
    subscriber_id: String,
    position_store: Arc<dyn PositionStore>,
    stop_flag: Arc<AtomicBool>,
}

/// A stop handle decoupled from the running loop: `stop()` is observed
/// between batches, never mid-batch.
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl Subscriber {
    pub fn new(
        store: EventStore,
        category: impl Into<String>,
        subscriber_id: impl Into<String>,
        position_store: Arc<dyn PositionStore>,
        handler: Handler,
    ) -> Self {
        Self {
            store,
            category: category.into(),
            handler,
            batch_size: 100,
            poll_interval: Duration::from_millis(500),
            subscriber_id: subscriber_id.into(),
            position_store,
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: self.stop_flag.clone(),
        }
    }

    /// Runs until `stop()` is called on a handle obtained before this call,
    /// or forever otherwise. A handler error is logged with full event
    /// context and halts the batch: position advances only up to (not past)
    /// the failing event, so the next poll retries it. `stop()` is observed
    /// only between batches, never mid-batch.
    pub async fn run(&self) -> Result<()> {
        let mut position = self.position_store.get(&self.subscriber_id).await?;

        loop {
            if self.stop_flag.load(Ordering::SeqCst) {
                return Ok(());
            }

            let batch = self
                .store
                .read_category(
                    &self.category,
                    position,
                    self.batch_size,
                    CategoryReadOptions::default(),
                )
                .await?;

            if batch.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            let mut advanced_to = position;
            let mut failed = false;
            for event in batch {
                let global_position = event.global_position;
                let stream_name = event.stream_name.clone();
                let event_type = event.event_type.clone();
                match (self.handler)(event).await {
                    Ok(()) => {
                        advanced_to = global_position + 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            subscriber_id = %self.subscriber_id,
                            stream_name = %stream_name,
                            event_type = %event_type,
                            global_position,
                            error = %e,
                            "subscriber handler failed; not advancing past this event"
                        );
                        failed = true;
                        break;
                    }
                }
            }

            if advanced_to > position {
                position = advanced_to;
                self.position_store.update(&self.subscriber_id, position).await?;
            }

            if failed {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::InMemoryPositionStore;

    #[test]
    fn stop_handle_flips_the_shared_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let handle = StopHandle { flag: flag.clone() };
        assert!(!flag.load(Ordering::SeqCst));
        handle.stop();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn position_store_starts_at_zero_for_unseen_subscriber() {
        let store = InMemoryPositionStore::new();
        assert_eq!(store.get("fresh").await.unwrap(), 0);
    }
}
