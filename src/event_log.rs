//! The append-only event log the outbox relay drains into. The on-the-wire
//! JSON shape of HTTP responses is out of scope for this crate, but the
//! event payload shape published here is a core external interface in its
//! own right, so its contract lives here.

use async_trait::async_trait;

use crate::error::LedgerError;

/// The event-log-assigned id of a published entry, opaque to the relay.
pub type EventLogId = String;

/// An append-only event log. The relay's only interaction with it is
/// `append`; replaying or consuming events back out to arbitrary consumers
/// is explicitly out of scope.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(
        &self,
        stream: &str,
        payload: &serde_json::Value,
    ) -> Result<EventLogId, LedgerError>;
}

/// In-memory [`EventLog`], used by tests to assert on what was published
/// without a real Redis stream.
pub mod memory {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{EventLog, EventLogId};
    use crate::error::LedgerError;

    #[derive(Debug, Clone)]
    pub struct PublishedEvent {
        pub stream: String,
        pub payload: serde_json::Value,
        pub id: EventLogId,
    }

    #[derive(Default)]
    pub struct InMemoryEventLog {
        published: Mutex<Vec<PublishedEvent>>,
        next_id: Mutex<u64>,
    }

    impl InMemoryEventLog {
        pub fn new() -> Self {
            InMemoryEventLog::default()
        }

        pub fn published(&self) -> Vec<PublishedEvent> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventLog for InMemoryEventLog {
        async fn append(
            &self,
            stream: &str,
            payload: &serde_json::Value,
        ) -> Result<EventLogId, LedgerError> {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            let id = format!("{next_id}-0");

            self.published.lock().unwrap().push(PublishedEvent {
                stream: stream.to_string(),
                payload: payload.clone(),
                id: id.clone(),
            });

            Ok(id)
        }
    }

    /// A log that always errors, used to exercise the relay's per-entry
    /// retry behaviour.
    #[derive(Default)]
    pub struct FailingEventLog;

    #[async_trait]
    impl EventLog for FailingEventLog {
        async fn append(
            &self,
            _stream: &str,
            _payload: &serde_json::Value,
        ) -> Result<EventLogId, LedgerError> {
            Err(LedgerError::Internal("event log unavailable".into()))
        }
    }
}

/// Redis-backed [`EventLog`] using a stream (`XADD`), the idiomatic Redis
/// primitive for an append-only, consumer-agnostic log.
pub mod redis_log {
    use async_trait::async_trait;
    use redis::AsyncCommands;

    use super::{EventLog, EventLogId};
    use crate::error::LedgerError;

    pub struct RedisEventLog {
        client: redis::Client,
    }

    impl RedisEventLog {
        pub fn new(url: &str) -> Result<Self, LedgerError> {
            let client = redis::Client::open(url)
                .map_err(|e| LedgerError::Internal(format!("redis client: {e}")))?;
            Ok(RedisEventLog { client })
        }
    }

    #[async_trait]
    impl EventLog for RedisEventLog {
        async fn append(
            &self,
            stream: &str,
            payload: &serde_json::Value,
        ) -> Result<EventLogId, LedgerError> {
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| LedgerError::Internal(format!("redis connect: {e}")))?;

            let body = serde_json::to_string(payload)
                .map_err(|e| LedgerError::Internal(format!("event payload serialization: {e}")))?;

            let id: String = conn
                .xadd(stream, "*", &[("payload", body)])
                .await
                .map_err(|e| LedgerError::Internal(format!("redis xadd: {e}")))?;

            Ok(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryEventLog;
    use super::*;

    #[tokio::test]
    async fn appended_events_are_recorded_in_order() {
        let log = InMemoryEventLog::new();
        log.append("stream", &serde_json::json!({"n": 1})).await.unwrap();
        log.append("stream", &serde_json::json!({"n": 2})).await.unwrap();

        let published = log.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].payload["n"], 1);
        assert_eq!(published[1].payload["n"], 2);
    }
}
