//! The ledger store: durable persistence with ACID semantics, row-level
//! pessimistic locking, and the structural invariants (uniqueness, check
//! constraints) the money engine depends on but does not itself enforce.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Limits;
use crate::error::LedgerError;
use crate::journal::{JournalEntry, JournalEntryType};
use crate::money::Money;
use crate::outbox::OutboxEntry;
use crate::wallet::{Currency, Wallet};

/// Half-open creation-time range filter, `[from, to)`, plus an optional exact
/// type match, for paginated journal reads.
#[derive(Debug, Clone, Default)]
pub struct JournalFilter {
    pub entry_type: Option<JournalEntryType>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

/// 1-indexed page number and page size, capped at 100 by the engine before
/// it ever reaches the store.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

/// A page of journal entries plus the totals needed to render pagination
/// metadata.
#[derive(Debug, Clone)]
pub struct JournalPage {
    pub entries: Vec<JournalEntry>,
    pub total_items: u64,
    pub total_pages: u64,
}

/// The three balance-mutating requests the store can execute atomically.
/// Each carries everything the store needs to perform semantic validation
/// (step 5 of the common pre-mutation protocol) under the wallet lock(s) it
/// has just acquired, because that is the earliest point the current wallet
/// state is known.
#[derive(Debug, Clone)]
pub enum MutationRequest {
    Deposit {
        wallet_id: Uuid,
        caller_user_id: String,
        amount: Money,
        idempotency_key: Option<String>,
        metadata: Option<serde_json::Value>,
    },
    Withdraw {
        wallet_id: Uuid,
        caller_user_id: String,
        amount: Money,
        idempotency_key: Option<String>,
        metadata: Option<serde_json::Value>,
    },
    Transfer {
        source_wallet_id: Uuid,
        destination_wallet_id: Uuid,
        caller_user_id: String,
        amount: Money,
        idempotency_key: Option<String>,
        metadata: Option<serde_json::Value>,
    },
}

/// The result of a successfully committed mutation: one journal entry for
/// deposit/withdraw, two (debit, credit) for a transfer, plus the outbox
/// entries co-written in the same transaction (returned so the caller, e.g.
/// tests, can assert on them without a second round trip).
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub entries: Vec<JournalEntry>,
    pub outbox_entries: Vec<OutboxEntry>,
}

/// The durable store contract the money engine is built against. Implemented
/// by a Postgres adapter for production and an in-memory adapter for tests.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates the schema if it does not already exist. A no-op for the
    /// in-memory adapter.
    async fn init_schema(&self) -> Result<(), LedgerError>;

    /// Inserts a wallet row plus a `wallet.created` outbox row in one
    /// transaction. Fails with `Conflict` on a duplicate `(user_id,
    /// currency)`.
    async fn create_wallet(
        &self,
        user_id: &str,
        currency: Currency,
        correlation_id: &str,
    ) -> Result<Wallet, LedgerError>;

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Wallet, LedgerError>;

    /// Executes one of the three mutating requests atomically: acquires the
    /// wallet lock(s) (in ascending wallet-id order for transfers),
    /// re-validates under that lock, applies the balance delta, appends the
    /// journal and outbox rows, and commits, or rolls back entirely on any
    /// failure.
    async fn execute_mutation(
        &self,
        request: MutationRequest,
        limits: &Limits,
        correlation_id: &str,
    ) -> Result<MutationOutcome, LedgerError>;

    /// Idempotency fast-path lookup: a previously committed journal entry
    /// carrying this idempotency token, if any. Safe to call outside any
    /// engine transaction.
    async fn find_journal_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<JournalEntry>, LedgerError>;

    /// Both legs of a transfer, given either leg's `transfer_id`. Used to
    /// complete the idempotency fast-path response for transfers, since only
    /// the debit leg carries the caller's idempotency token.
    async fn find_transfer_legs(
        &self,
        transfer_id: Uuid,
    ) -> Result<Option<(JournalEntry, JournalEntry)>, LedgerError>;

    async fn list_journal_entries(
        &self,
        wallet_id: Uuid,
        filter: JournalFilter,
        pagination: Pagination,
    ) -> Result<JournalPage, LedgerError>;

    /// Up to `batch_size` unpublished outbox rows, oldest first.
    async fn fetch_unpublished_outbox(&self, batch_size: u32) -> Result<Vec<OutboxEntry>, LedgerError>;

    /// Marks the given outbox row ids published, in one bulk update.
    async fn mark_outbox_published(&self, ids: &[i64]) -> Result<(), LedgerError>;
}
