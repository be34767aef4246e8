//! A transactional digital wallet ledger: concurrency-safe balances, an
//! immutable journal, a transactional outbox, and a sliding-window rate
//! limiter.
//!
//! This crate owns wallet balances, records every movement as an immutable
//! journal entry, and reliably emits a corresponding event stream. HTTP
//! routing, authentication, and the wire shape of responses are glue the
//! crate does not provide; see [`MoneyEngine`] and [`OutboxRelay`] for the
//! seams a caller wires up around it.

pub mod config;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod journal;
pub mod money;
pub mod outbox;
pub mod rate_limit;
pub mod relay;
pub mod store;
pub mod wallet;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;

pub use config::Config;
pub use engine::{BalanceView, FundsMovementRequest, JournalHistoryRequest, MoneyEngine, TransferRequest};
pub use error::LedgerError;
pub use event_log::EventLog;
pub use journal::{JournalEntry, JournalEntryType, JournalStatus};
pub use money::Money;
pub use outbox::OutboxEntry;
pub use rate_limit::RateLimiter;
pub use relay::OutboxRelay;
pub use store::LedgerStore;
pub use wallet::{Currency, Wallet, WalletStatus};

/// Everything a glue layer needs to start serving requests: the assembled
/// engine and a handle to stop the outbox relay's background task.
///
/// Construction follows a fixed startup order: ledger store connect, then
/// event log connect, then relay start. The listener itself (HTTP routing)
/// is out of scope and is the caller's responsibility to start last.
pub struct Ledger {
    pub engine: Arc<MoneyEngine>,
    relay_shutdown: watch::Sender<bool>,
    relay_handle: tokio::task::JoinHandle<()>,
}

impl Ledger {
    /// Connects to Postgres and Redis, runs schema migration, and starts the
    /// outbox relay on its own task.
    pub async fn bootstrap(config: Config) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .connect(&config.database_url)
            .await
            .map_err(LedgerError::from)?;
        let store: Arc<dyn LedgerStore> = Arc::new(store::postgres::PostgresStore::new(pool));
        store.init_schema().await?;

        let event_log: Arc<dyn EventLog> = Arc::new(event_log::redis_log::RedisEventLog::new(&config.event_log_url)?);
        let rate_limit_store = Arc::new(rate_limit::redis_store::RedisRateLimitStore::new(&config.event_log_url)?);

        let rate_limiter = RateLimiter::new(rate_limit_store, config.rate_limits);
        let engine = Arc::new(MoneyEngine::new(store.clone(), rate_limiter, config.limits));

        let relay = Arc::new(OutboxRelay::new(
            store,
            event_log,
            config.event_log_stream,
            config.outbox,
        ));
        let (relay_shutdown, relay_handle) = relay::spawn(relay);

        Ok(Ledger {
            engine,
            relay_shutdown,
            relay_handle,
        })
    }

    /// Stops the relay first, honouring the reverse of the startup order:
    /// stop accepting requests, stop the relay, close the event log, close
    /// the store. The store and event log connections are dropped by the
    /// caller once this returns, closing them last.
    pub async fn shutdown(self, drain_deadline: Duration) {
        relay::shutdown(self.relay_shutdown, self.relay_handle, drain_deadline).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::{Limits, RateLimitConfig};
    use crate::engine::{FundsMovementRequest, MoneyEngine};
    use crate::event_log::memory::InMemoryEventLog;
    use crate::rate_limit::memory::InMemoryRateLimitStore;
    use crate::rate_limit::RateLimiter;
    use crate::relay::{self, OutboxRelay};
    use crate::store::memory::MemoryStore;
    use crate::store::LedgerStore;
    use crate::wallet::Currency;

    /// End-to-end: create a wallet, deposit, and see the resulting events
    /// land in the event log via the relay, exercising the full engine ->
    /// store -> relay -> event-log path in-memory.
    #[tokio::test]
    async fn deposit_is_relayed_to_the_event_log() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let rate_limiter = RateLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            RateLimitConfig {
                wallet_limit_per_minute: 1000,
                user_limit_per_minute: 1000,
                global_limit_per_minute: 1000,
            },
        );
        let engine = MoneyEngine::new(store.clone(), rate_limiter, Limits::for_tests());

        let wallet = engine.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();
        engine
            .deposit(FundsMovementRequest {
                wallet_id: wallet.id,
                caller_user_id: "alice".to_string(),
                amount: "100.50".to_string(),
                idempotency_key: Some("k1".to_string()),
                correlation_id: "corr-1".to_string(),
                metadata: None,
            })
            .await
            .unwrap();

        let event_log = Arc::new(InMemoryEventLog::new());
        let relay = Arc::new(OutboxRelay::new(
            store,
            event_log.clone(),
            "wallet-events".to_string(),
            crate::config::OutboxConfig {
                poll_interval: std::time::Duration::from_millis(10),
                batch_size: 10,
            },
        ));
        let (shutdown_tx, handle) = relay::spawn(relay);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        relay::shutdown(shutdown_tx, handle, std::time::Duration::from_secs(1)).await;

        let published = event_log.published();
        assert_eq!(published.len(), 2, "wallet.created + funds.deposited");
        assert_eq!(published[0].payload["event_type"], "wallet.created");
        assert_eq!(published[1].payload["event_type"], "funds.deposited");
    }
}
