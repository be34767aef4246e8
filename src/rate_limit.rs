//! The distributed rate limiter: a sliding-window counter over a shared
//! store, keyed per wallet / per user / globally, failing open on backing
//! store failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::RateLimitConfig;
use crate::error::LedgerError;

const WINDOW_SECS: i64 = 60;

/// One of the three scopes a mutating request is gated on, tried in this
/// order: wallet, then user, then global. The first scope to reject
/// short-circuits the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    Wallet,
    User,
    Global,
}

impl RateLimitScope {
    fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Wallet => "wallet",
            RateLimitScope::User => "user",
            RateLimitScope::Global => "global",
        }
    }
}

/// The shared sliding-window backing store. Every call performs, atomically:
/// drop entries older than `now - window_secs`, count what remains, insert a
/// new entry keyed by a unique token, refresh the key's TTL. Returns the
/// *pre-insert* count, which is what the decision rule consults.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn record_and_count(
        &self,
        key: &str,
        window_secs: i64,
    ) -> Result<u64, LedgerError>;
}

/// Sliding-window counter keyed by `ratelimit:<scope>:<subject>`, gating
/// mutating requests. Fails open: if the backing store is unreachable or
/// errors, every scope is treated as allowed, because ledger availability
/// outweighs strict rate enforcement.
pub struct RateLimiter {
    store: std::sync::Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
}

/// The outcome of a scope check: either the request is admitted, or it is
/// rejected with the details the error taxonomy's `rate_limit_exceeded`
/// variant carries.
#[derive(Debug, Clone, Copy)]
pub enum RateLimitDecision {
    Admitted,
    Rejected { reset_at: DateTime<Utc> },
}

impl RateLimiter {
    pub fn new(store: std::sync::Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        RateLimiter { store, config }
    }

    fn limit_for(&self, scope: RateLimitScope) -> u32 {
        match scope {
            RateLimitScope::Wallet => self.config.wallet_limit_per_minute,
            RateLimitScope::User => self.config.user_limit_per_minute,
            RateLimitScope::Global => self.config.global_limit_per_minute,
        }
    }

    async fn check_scope(&self, scope: RateLimitScope, subject: &str) -> RateLimitDecision {
        let key = format!("ratelimit:{}:{}", scope.as_str(), subject);
        match self.store.record_and_count(&key, WINDOW_SECS).await {
            Ok(count) => {
                if count >= self.limit_for(scope) as u64 {
                    tracing::warn!(scope = scope.as_str(), subject, count, "rate limit exceeded");
                    RateLimitDecision::Rejected {
                        reset_at: Utc::now() + chrono::Duration::seconds(WINDOW_SECS),
                    }
                } else {
                    RateLimitDecision::Admitted
                }
            }
            Err(err) => {
                tracing::warn!(scope = scope.as_str(), subject, %err, "rate limit store unavailable, failing open");
                RateLimitDecision::Admitted
            }
        }
    }

    /// Checks wallet, then user, then global scope, in that order, stopping
    /// at the first rejection. `wallet_id` is `None` for requests with no
    /// single wallet subject (there are none among the core's mutating
    /// operations today, but the precedence rule is expressed generally).
    pub async fn admit(
        &self,
        wallet_id: Option<Uuid>,
        user_id: &str,
    ) -> Result<(), LedgerError> {
        if let Some(wallet_id) = wallet_id
            && let RateLimitDecision::Rejected { reset_at } =
                self.check_scope(RateLimitScope::Wallet, &wallet_id.to_string()).await
        {
            return Err(LedgerError::RateLimitExceeded { reset_at });
        }

        if let RateLimitDecision::Rejected { reset_at } =
            self.check_scope(RateLimitScope::User, user_id).await
        {
            return Err(LedgerError::RateLimitExceeded { reset_at });
        }

        if let RateLimitDecision::Rejected { reset_at } =
            self.check_scope(RateLimitScope::Global, "*").await
        {
            return Err(LedgerError::RateLimitExceeded { reset_at });
        }

        Ok(())
    }
}

/// In-memory [`RateLimitStore`], used by tests and the default dev path.
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use super::RateLimitStore;
    use crate::error::LedgerError;

    #[derive(Default)]
    pub struct InMemoryRateLimitStore {
        windows: Mutex<HashMap<String, Vec<i64>>>,
    }

    impl InMemoryRateLimitStore {
        pub fn new() -> Self {
            InMemoryRateLimitStore::default()
        }
    }

    #[async_trait]
    impl RateLimitStore for InMemoryRateLimitStore {
        async fn record_and_count(&self, key: &str, window_secs: i64) -> Result<u64, LedgerError> {
            let now = Utc::now().timestamp_millis();
            let cutoff = now - window_secs * 1000;

            let mut windows = self.windows.lock().unwrap();
            let entries = windows.entry(key.to_string()).or_default();
            entries.retain(|&ts| ts > cutoff);
            let count = entries.len() as u64;
            entries.push(now);
            let _ = Uuid::now_v7(); // unique per-call token, mirroring the store's (timestamp, token) pair shape
            Ok(count)
        }
    }

    /// A store that always errors, used to test the fail-open contract.
    #[derive(Default)]
    pub struct UnreachableRateLimitStore;

    #[async_trait]
    impl RateLimitStore for UnreachableRateLimitStore {
        async fn record_and_count(&self, _key: &str, _window_secs: i64) -> Result<u64, LedgerError> {
            Err(LedgerError::Internal("rate limit store unreachable".into()))
        }
    }
}

/// Redis-backed [`RateLimitStore`] using a sorted set per key: members are
/// unique per-call tokens, scores are millisecond timestamps. One Lua script
/// performs the trim/count/insert/expire sequence atomically: `ZREMRANGEBYSCORE`,
/// `ZCARD`, `ZADD`, `EXPIRE`.
pub mod redis_store {
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use super::RateLimitStore;
    use crate::error::LedgerError;

    const SLIDING_WINDOW_SCRIPT: &str = r#"
        local key = KEYS[1]
        local now_ms = tonumber(ARGV[1])
        local window_ms = tonumber(ARGV[2])
        local token = ARGV[3]
        local ttl_secs = tonumber(ARGV[4])

        redis.call('ZREMRANGEBYSCORE', key, '-inf', now_ms - window_ms)
        local count = redis.call('ZCARD', key)
        redis.call('ZADD', key, now_ms, token)
        redis.call('EXPIRE', key, ttl_secs)
        return count
    "#;

    pub struct RedisRateLimitStore {
        client: redis::Client,
    }

    impl RedisRateLimitStore {
        pub fn new(url: &str) -> Result<Self, LedgerError> {
            let client = redis::Client::open(url)
                .map_err(|e| LedgerError::Internal(format!("redis client: {e}")))?;
            Ok(RedisRateLimitStore { client })
        }
    }

    #[async_trait]
    impl RateLimitStore for RedisRateLimitStore {
        async fn record_and_count(&self, key: &str, window_secs: i64) -> Result<u64, LedgerError> {
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| LedgerError::Internal(format!("redis connect: {e}")))?;

            let now_ms = Utc::now().timestamp_millis();
            let token = Uuid::now_v7().to_string();

            let count: u64 = redis::Script::new(SLIDING_WINDOW_SCRIPT)
                .key(key)
                .arg(now_ms)
                .arg(window_secs * 1000)
                .arg(token)
                .arg(window_secs)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| LedgerError::Internal(format!("redis script: {e}")))?;

            Ok(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::memory::{InMemoryRateLimitStore, UnreachableRateLimitStore};
    use super::*;

    fn config(limit: u32) -> RateLimitConfig {
        RateLimitConfig {
            wallet_limit_per_minute: limit,
            user_limit_per_minute: limit,
            global_limit_per_minute: limit,
        }
    }

    #[tokio::test]
    async fn admits_until_limit_then_rejects() {
        let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()), config(3));
        let wallet_id = Uuid::now_v7();

        for _ in 0..3 {
            limiter.admit(Some(wallet_id), "alice").await.unwrap();
        }

        let result = limiter.admit(Some(wallet_id), "alice").await;
        assert!(matches!(result, Err(LedgerError::RateLimitExceeded { .. })));
    }

    #[tokio::test]
    async fn fails_open_when_store_unreachable() {
        let limiter = RateLimiter::new(Arc::new(UnreachableRateLimitStore), config(1));
        let wallet_id = Uuid::now_v7();

        for _ in 0..10 {
            limiter.admit(Some(wallet_id), "alice").await.unwrap();
        }
    }

    #[tokio::test]
    async fn independent_subjects_have_independent_windows() {
        let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()), config(1));
        let w1 = Uuid::now_v7();
        let w2 = Uuid::now_v7();

        limiter.admit(Some(w1), "alice").await.unwrap();
        assert!(limiter.admit(Some(w1), "alice").await.is_err());
        limiter.admit(Some(w2), "bob").await.unwrap();
    }
}
