//! The money engine: the three balance-mutating operations plus the two
//! read operations, each following a common pre-mutation protocol: rate
//! limit, idempotency fast-path, store-level locking and validation, atomic
//! journal and outbox co-write.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::histogram;
use serde_json::Value;
use uuid::Uuid;

use crate::config::Limits;
use crate::error::LedgerError;
use crate::journal::{hash_idempotency_key, JournalEntry, JournalEntryType};
use crate::money::Money;
use crate::rate_limit::RateLimiter;
use crate::store::{JournalFilter, JournalPage, LedgerStore, MutationOutcome, MutationRequest, Pagination};
use crate::wallet::{Currency, Wallet};

const MAX_PAGE_SIZE: u32 = 100;
const MAX_USER_ID_LEN: usize = 255;

/// Parameters common to deposit and withdraw.
#[derive(Debug, Clone)]
pub struct FundsMovementRequest {
    pub wallet_id: Uuid,
    pub caller_user_id: String,
    pub amount: String,
    pub idempotency_key: Option<String>,
    pub correlation_id: String,
    pub metadata: Option<Value>,
}

/// Parameters for a transfer.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source_wallet_id: Uuid,
    pub destination_wallet_id: Uuid,
    pub caller_user_id: String,
    pub amount: String,
    pub idempotency_key: Option<String>,
    pub correlation_id: String,
    pub metadata: Option<Value>,
}

/// The result of reading a wallet's current balance.
#[derive(Debug, Clone)]
pub struct BalanceView {
    pub wallet_id: Uuid,
    pub balance: Money,
    pub currency: Currency,
    pub read_at: DateTime<Utc>,
}

/// Filter and pagination parameters for journal history, validated and
/// capped before ever reaching the store.
#[derive(Debug, Clone, Default)]
pub struct JournalHistoryRequest {
    pub wallet_id: Uuid,
    pub caller_user_id: String,
    pub entry_type: Option<JournalEntryType>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub page: u32,
    pub page_size: u32,
}

/// The money engine: validates, locks, mutates, journals, and emits outbox
/// records for deposit/withdraw/transfer, plus the two read operations.
/// Does not itself open HTTP listeners or parse wire formats.
pub struct MoneyEngine {
    store: Arc<dyn LedgerStore>,
    rate_limiter: RateLimiter,
    limits: Limits,
}

impl MoneyEngine {
    pub fn new(store: Arc<dyn LedgerStore>, rate_limiter: RateLimiter, limits: Limits) -> Self {
        MoneyEngine {
            store,
            rate_limiter,
            limits,
        }
    }

    /// Creates the substrate the three money operations act on. Not itself
    /// one of the three balance-mutating operations; see DESIGN.md for why a
    /// wallet-creation entry point is required anyway.
    #[tracing::instrument(skip(self))]
    pub async fn create_wallet(
        &self,
        user_id: &str,
        currency: Currency,
        correlation_id: &str,
    ) -> Result<Wallet, LedgerError> {
        if user_id.is_empty() || user_id.len() > MAX_USER_ID_LEN {
            return Err(LedgerError::Validation(format!(
                "user_id must be 1 to {MAX_USER_ID_LEN} characters, got {}",
                user_id.len()
            )));
        }
        self.store.create_wallet(user_id, currency, correlation_id).await
    }

    #[tracing::instrument(skip(self, request), fields(wallet_id = %request.wallet_id))]
    pub async fn deposit(&self, request: FundsMovementRequest) -> Result<JournalEntry, LedgerError> {
        let idempotency_key = request.idempotency_key.as_deref().map(hash_idempotency_key);

        if let Some(key) = &idempotency_key
            && let Some(existing) = self.store.find_journal_by_idempotency_key(key).await?
        {
            return Ok(existing);
        }

        let amount = Money::parse_positive(&request.amount)?;

        self.rate_limiter
            .admit(Some(request.wallet_id), &request.caller_user_id)
            .await?;

        let start = Instant::now();
        let outcome = self
            .store
            .execute_mutation(
                MutationRequest::Deposit {
                    wallet_id: request.wallet_id,
                    caller_user_id: request.caller_user_id,
                    amount,
                    idempotency_key,
                    metadata: request.metadata,
                },
                &self.limits,
                &request.correlation_id,
            )
            .await?;
        histogram!("wallet_ledger.mutation.duration_ms", "operation" => "deposit")
            .record(start.elapsed().as_millis() as f64);

        Ok(single_entry(outcome))
    }

    #[tracing::instrument(skip(self, request), fields(wallet_id = %request.wallet_id))]
    pub async fn withdraw(&self, request: FundsMovementRequest) -> Result<JournalEntry, LedgerError> {
        let idempotency_key = request.idempotency_key.as_deref().map(hash_idempotency_key);

        if let Some(key) = &idempotency_key
            && let Some(existing) = self.store.find_journal_by_idempotency_key(key).await?
        {
            return Ok(existing);
        }

        let amount = Money::parse_positive(&request.amount)?;

        self.rate_limiter
            .admit(Some(request.wallet_id), &request.caller_user_id)
            .await?;

        let start = Instant::now();
        let outcome = self
            .store
            .execute_mutation(
                MutationRequest::Withdraw {
                    wallet_id: request.wallet_id,
                    caller_user_id: request.caller_user_id,
                    amount,
                    idempotency_key,
                    metadata: request.metadata,
                },
                &self.limits,
                &request.correlation_id,
            )
            .await?;
        histogram!("wallet_ledger.mutation.duration_ms", "operation" => "withdraw")
            .record(start.elapsed().as_millis() as f64);

        Ok(single_entry(outcome))
    }

    #[tracing::instrument(skip(self, request), fields(source = %request.source_wallet_id, destination = %request.destination_wallet_id))]
    pub async fn transfer(&self, request: TransferRequest) -> Result<(JournalEntry, JournalEntry), LedgerError> {
        if request.source_wallet_id == request.destination_wallet_id {
            return Err(LedgerError::InvalidTransfer(
                "source and destination wallets must differ".into(),
            ));
        }

        let idempotency_key = request.idempotency_key.as_deref().map(hash_idempotency_key);

        if let Some(key) = &idempotency_key
            && let Some(debit) = self.store.find_journal_by_idempotency_key(key).await?
        {
            // Replay by transfer_id, not `related_wallet_id`; see DESIGN.md's
            // record of the Open Question this resolves.
            let transfer_id = debit.transfer_id().ok_or_else(|| {
                LedgerError::Internal("idempotent replay matched a non-transfer journal entry".into())
            })?;
            let (debit, credit) = self
                .store
                .find_transfer_legs(transfer_id)
                .await?
                .ok_or_else(|| LedgerError::Internal("transfer counterpart leg missing".into()))?;
            return Ok((debit, credit));
        }

        let amount = Money::parse_positive(&request.amount)?;

        self.rate_limiter
            .admit(Some(request.source_wallet_id), &request.caller_user_id)
            .await?;

        let start = Instant::now();
        let outcome = self
            .store
            .execute_mutation(
                MutationRequest::Transfer {
                    source_wallet_id: request.source_wallet_id,
                    destination_wallet_id: request.destination_wallet_id,
                    caller_user_id: request.caller_user_id,
                    amount,
                    idempotency_key,
                    metadata: request.metadata,
                },
                &self.limits,
                &request.correlation_id,
            )
            .await?;
        histogram!("wallet_ledger.mutation.duration_ms", "operation" => "transfer")
            .record(start.elapsed().as_millis() as f64);

        let mut entries = outcome.entries.into_iter();
        let debit = entries.next().ok_or_else(|| LedgerError::Internal("transfer produced no debit leg".into()))?;
        let credit = entries.next().ok_or_else(|| LedgerError::Internal("transfer produced no credit leg".into()))?;
        Ok((debit, credit))
    }

    /// Returns the current balance of a wallet the caller owns; rejects with
    /// `forbidden` otherwise. Not rate-limited; rate limiting gates mutating
    /// requests only.
    #[tracing::instrument(skip(self))]
    pub async fn get_balance(&self, wallet_id: Uuid, caller_user_id: &str) -> Result<BalanceView, LedgerError> {
        let wallet = self.store.get_wallet(wallet_id).await?;
        if !wallet.is_owned_by(caller_user_id) {
            return Err(LedgerError::Forbidden);
        }

        Ok(BalanceView {
            wallet_id: wallet.id,
            balance: wallet.balance,
            currency: wallet.currency,
            read_at: Utc::now(),
        })
    }

    /// Paginated, filtered journal history for a wallet the caller owns.
    #[tracing::instrument(skip(self, request), fields(wallet_id = %request.wallet_id))]
    pub async fn list_journal(&self, request: JournalHistoryRequest) -> Result<JournalPage, LedgerError> {
        let wallet = self.store.get_wallet(request.wallet_id).await?;
        if !wallet.is_owned_by(&request.caller_user_id) {
            return Err(LedgerError::Forbidden);
        }

        if request.page_size == 0 || request.page_size > MAX_PAGE_SIZE {
            return Err(LedgerError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if request.page == 0 {
            return Err(LedgerError::Validation("page must be 1-indexed".into()));
        }

        self.store
            .list_journal_entries(
                request.wallet_id,
                JournalFilter {
                    entry_type: request.entry_type,
                    created_from: request.created_from,
                    created_to: request.created_to,
                },
                Pagination {
                    page: request.page,
                    page_size: request.page_size,
                },
            )
            .await
    }
}

fn single_entry(outcome: MutationOutcome) -> JournalEntry {
    outcome
        .entries
        .into_iter()
        .next()
        .expect("single-wallet mutation always produces exactly one journal entry")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::RateLimitConfig;
    use crate::rate_limit::memory::InMemoryRateLimitStore;
    use crate::store::memory::MemoryStore;

    fn engine() -> MoneyEngine {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let rate_limiter = RateLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            RateLimitConfig {
                wallet_limit_per_minute: 1000,
                user_limit_per_minute: 1000,
                global_limit_per_minute: 1000,
            },
        );
        MoneyEngine::new(store, rate_limiter, Limits::for_tests())
    }

    fn movement(wallet_id: Uuid, user: &str, amount: &str) -> FundsMovementRequest {
        FundsMovementRequest {
            wallet_id,
            caller_user_id: user.to_string(),
            amount: amount.to_string(),
            idempotency_key: None,
            correlation_id: "corr-1".to_string(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn deposit_then_read_back() {
        let engine = engine();
        let wallet = engine.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();

        let entry = engine
            .deposit(movement(wallet.id, "alice", "100.50"))
            .await
            .unwrap();
        assert_eq!(entry.balance_after.to_internal_string(), "100.5000");

        let balance = engine.get_balance(wallet.id, "alice").await.unwrap();
        assert_eq!(balance.balance.to_internal_string(), "100.5000");
    }

    #[tokio::test]
    async fn deposit_idempotency_replays_same_entry() {
        let engine = engine();
        let wallet = engine.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();

        let mut request = movement(wallet.id, "alice", "100.50");
        request.idempotency_key = Some("k1".to_string());

        let first = engine.deposit(request.clone()).await.unwrap();
        let second = engine.deposit(request).await.unwrap();
        assert_eq!(first.id, second.id);

        let balance = engine.get_balance(wallet.id, "alice").await.unwrap();
        assert_eq!(balance.balance.to_internal_string(), "100.5000");
    }

    #[tokio::test]
    async fn withdraw_insufficient_funds() {
        let engine = engine();
        let wallet = engine.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();
        engine.deposit(movement(wallet.id, "alice", "125.00")).await.unwrap();

        let err = engine.withdraw(movement(wallet.id, "alice", "200.00")).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        let balance = engine.get_balance(wallet.id, "alice").await.unwrap();
        assert_eq!(balance.balance.to_internal_string(), "125.0000");
    }

    #[tokio::test]
    async fn transfer_moves_funds_and_shares_a_transfer_id() {
        let engine = engine();
        let w1 = engine.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();
        let w2 = engine.create_wallet("bob", Currency::Usd, "corr-0").await.unwrap();
        engine.deposit(movement(w1.id, "alice", "100.00")).await.unwrap();
        engine.deposit(movement(w2.id, "bob", "200.00")).await.unwrap();

        let (debit, credit) = engine
            .transfer(TransferRequest {
                source_wallet_id: w1.id,
                destination_wallet_id: w2.id,
                caller_user_id: "alice".to_string(),
                amount: "30.00".to_string(),
                idempotency_key: None,
                correlation_id: "corr-1".to_string(),
                metadata: None,
            })
            .await
            .unwrap();

        assert_eq!(debit.transfer_id(), credit.transfer_id());
        assert_eq!(debit.amount, credit.amount);

        let alice_balance = engine.get_balance(w1.id, "alice").await.unwrap();
        let bob_balance = engine.get_balance(w2.id, "bob").await.unwrap();
        assert_eq!(alice_balance.balance.to_internal_string(), "70.0000");
        assert_eq!(bob_balance.balance.to_internal_string(), "230.0000");
    }

    #[tokio::test]
    async fn self_transfer_rejected() {
        let engine = engine();
        let wallet = engine.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();

        let err = engine
            .transfer(TransferRequest {
                source_wallet_id: wallet.id,
                destination_wallet_id: wallet.id,
                caller_user_id: "alice".to_string(),
                amount: "10.00".to_string(),
                idempotency_key: None,
                correlation_id: "corr-1".to_string(),
                metadata: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InvalidTransfer(_)));
    }

    #[tokio::test]
    async fn currency_mismatch_rejected() {
        let engine = engine();
        let w1 = engine.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();
        let w3 = engine.create_wallet("alice", Currency::Eur, "corr-0").await.unwrap();
        engine.deposit(movement(w1.id, "alice", "100.00")).await.unwrap();

        let err = engine
            .transfer(TransferRequest {
                source_wallet_id: w1.id,
                destination_wallet_id: w3.id,
                caller_user_id: "alice".to_string(),
                amount: "10.00".to_string(),
                idempotency_key: None,
                correlation_id: "corr-1".to_string(),
                metadata: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::CurrencyMismatch));
    }

    #[tokio::test]
    async fn ownership_enforced_on_reads_and_mutations() {
        let engine = engine();
        let wallet = engine.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();

        let err = engine.get_balance(wallet.id, "mallory").await.unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden));

        let err = engine.deposit(movement(wallet.id, "mallory", "10.00")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden));
    }

    #[tokio::test]
    async fn journal_history_paginates_and_filters_by_type() {
        let engine = engine();
        let wallet = engine.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();

        for _ in 0..5 {
            engine.deposit(movement(wallet.id, "alice", "1.00")).await.unwrap();
        }
        for _ in 0..2 {
            engine.withdraw(movement(wallet.id, "alice", "1.00")).await.unwrap();
        }

        let page = engine
            .list_journal(JournalHistoryRequest {
                wallet_id: wallet.id,
                caller_user_id: "alice".to_string(),
                entry_type: Some(JournalEntryType::Deposit),
                created_from: None,
                created_to: None,
                page: 1,
                page_size: 3,
            })
            .await
            .unwrap();

        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.total_items, 5);
        assert_eq!(page.total_pages, 2);
        assert!(page.entries.iter().all(|e| e.entry_type == JournalEntryType::Deposit));
    }

    #[tokio::test]
    async fn page_size_above_cap_is_rejected() {
        let engine = engine();
        let wallet = engine.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();

        let err = engine
            .list_journal(JournalHistoryRequest {
                wallet_id: wallet.id,
                caller_user_id: "alice".to_string(),
                entry_type: None,
                created_from: None,
                created_to: None,
                page: 1,
                page_size: 101,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Validation(_)));
    }
}
