//! The transactional outbox relay: a single long-lived background worker
//! that moves committed-but-unpublished outbox rows to the append-only event
//! log with at-least-once delivery, batching, per-entry retry, and graceful
//! shutdown.
//!
//! Shaped as a struct holding `Arc<dyn LedgerStore>` and `Arc<dyn EventLog>`,
//! driven by `tokio::select!` between a poll-interval sleep and a shutdown
//! signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::OutboxConfig;
use crate::event_log::EventLog;
use crate::store::LedgerStore;

/// Drains the outbox into the event log. Holds its own long-lived references
/// to the store and event log, constructed once at startup and run to
/// completion on its own task.
pub struct OutboxRelay {
    store: Arc<dyn LedgerStore>,
    event_log: Arc<dyn EventLog>,
    stream: String,
    config: OutboxConfig,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        event_log: Arc<dyn EventLog>,
        stream: String,
        config: OutboxConfig,
    ) -> Self {
        OutboxRelay {
            store,
            event_log,
            stream,
            config,
        }
    }

    /// Runs the polling loop until `shutdown` fires. Finishes whatever batch
    /// is in flight before returning; shutdown is honoured at batch
    /// boundaries, never mid-batch.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "outbox relay starting"
        );

        loop {
            if let Err(err) = self.drain_batch().await {
                tracing::error!(%err, "outbox relay batch failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("outbox relay stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Pulls up to `batch_size` unpublished entries, publishes each in
    /// order, and marks the ones that succeeded published in one bulk
    /// update. Entries that fail to publish are left unmodified so the next
    /// tick retries them; a single failure never blocks the rest of the
    /// batch.
    async fn drain_batch(&self) -> Result<(), crate::error::LedgerError> {
        let batch = self.store.fetch_unpublished_outbox(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut published_ids = Vec::with_capacity(batch.len());
        for entry in &batch {
            match self.event_log.append(&self.stream, &entry.payload).await {
                Ok(event_log_id) => {
                    tracing::debug!(
                        outbox_id = entry.id,
                        event_type = %entry.event_type,
                        event_log_id,
                        "published outbox entry"
                    );
                    published_ids.push(entry.id);
                }
                Err(err) => {
                    tracing::warn!(outbox_id = entry.id, %err, "failed to publish outbox entry, will retry");
                }
            }
        }

        if !published_ids.is_empty() {
            self.store.mark_outbox_published(&published_ids).await?;
        }

        Ok(())
    }
}

/// Spawns the relay's polling loop on its own task, returning a shutdown
/// handle the caller signals at stop time. Expects the relay to be started
/// after the store and event log are connected, and stopped before they are
/// closed.
pub fn spawn(relay: Arc<OutboxRelay>) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        relay.run(rx).await;
    });
    (tx, handle)
}

/// Signals shutdown and waits for the in-flight batch to finish.
pub async fn shutdown(tx: watch::Sender<bool>, handle: tokio::task::JoinHandle<()>, drain_deadline: Duration) {
    let _ = tx.send(true);
    if tokio::time::timeout(drain_deadline, handle).await.is_err() {
        tracing::warn!("outbox relay did not stop within the drain deadline");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::OutboxConfig;
    use crate::event_log::memory::{FailingEventLog, InMemoryEventLog};
    use crate::store::memory::MemoryStore;
    use crate::store::LedgerStore;
    use crate::wallet::Currency;

    fn config() -> OutboxConfig {
        OutboxConfig {
            poll_interval: Duration::from_millis(10),
            batch_size: 10,
        }
    }

    #[tokio::test]
    async fn drains_unpublished_entries_into_the_event_log() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        store.create_wallet("alice", Currency::Usd, "corr-1").await.unwrap();

        let event_log = Arc::new(InMemoryEventLog::new());
        let relay = OutboxRelay::new(store.clone(), event_log.clone(), "wallet-events".into(), config());

        relay.drain_batch().await.unwrap();

        assert_eq!(event_log.published().len(), 1);
        let unpublished = store.fetch_unpublished_outbox(10).await.unwrap();
        assert!(unpublished.is_empty());
    }

    #[tokio::test]
    async fn failed_publish_is_left_unpublished_for_retry() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        store.create_wallet("alice", Currency::Usd, "corr-1").await.unwrap();

        let event_log = Arc::new(FailingEventLog);
        let relay = OutboxRelay::new(store.clone(), event_log, "wallet-events".into(), config());

        relay.drain_batch().await.unwrap();

        let unpublished = store.fetch_unpublished_outbox(10).await.unwrap();
        assert_eq!(unpublished.len(), 1, "failed entry must remain unpublished for the next tick");
    }

    #[tokio::test]
    async fn shutdown_stops_the_poll_loop() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let event_log = Arc::new(InMemoryEventLog::new());
        let relay = Arc::new(OutboxRelay::new(store, event_log, "wallet-events".into(), config()));

        let (tx, handle) = spawn(relay);
        shutdown(tx, handle, Duration::from_secs(1)).await;
    }
}
