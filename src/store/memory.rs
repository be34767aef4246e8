use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::config::Limits;
use crate::error::LedgerError;
use crate::journal::{JournalEntry, JournalEntryType, JournalStatus};
use crate::outbox::{
    event_kind, funds_movement_payload, transfer_leg_payload, wallet_created_payload, OutboxEntry,
};
use crate::wallet::{Currency, Wallet, WalletStatus};

use super::{JournalFilter, JournalPage, LedgerStore, MutationOutcome, MutationRequest, Pagination};

/// In-memory [`LedgerStore`], used by unit tests and as a fast local
/// development path. Holds every collection behind a single mutex for the
/// whole call, the in-memory equivalent of `BEGIN ... SELECT FOR UPDATE ...
/// COMMIT`.
#[derive(Default)]
struct Inner {
    wallets: HashMap<Uuid, Wallet>,
    wallets_by_user_currency: HashMap<(String, Currency), Uuid>,
    journal: HashMap<Uuid, JournalEntry>,
    journal_by_idempotency_key: HashMap<String, Uuid>,
    outbox: Vec<OutboxEntry>,
    next_outbox_id: i64,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Forces a wallet into the given lifecycle state, bypassing the (out of
    /// scope) transition operations. Exists for tests that need to exercise
    /// `InvalidState` without a transition API.
    #[cfg(test)]
    fn set_wallet_status(&self, wallet_id: Uuid, status: WalletStatus) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(wallet) = inner.wallets.get_mut(&wallet_id) {
            wallet.status = status;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn init_schema(&self) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn create_wallet(
        &self,
        user_id: &str,
        currency: Currency,
        correlation_id: &str,
    ) -> Result<Wallet, LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (user_id.to_string(), currency);
        if inner.wallets_by_user_currency.contains_key(&key) {
            return Err(LedgerError::Conflict(format!(
                "wallet already exists for user {user_id} in {}",
                currency.as_str()
            )));
        }

        let wallet = Wallet::new(user_id.to_string(), currency);
        let payload = wallet_created_payload(&wallet, correlation_id);
        inner.next_outbox_id += 1;
        let outbox_id = inner.next_outbox_id;
        inner.outbox.push(OutboxEntry {
            id: outbox_id,
            event_type: event_kind::WALLET_CREATED.to_string(),
            aggregate_id: wallet.id,
            payload,
            published: false,
            published_at: None,
            created_at: Utc::now(),
        });
        inner.wallets_by_user_currency.insert(key, wallet.id);
        inner.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Wallet, LedgerError> {
        let inner = self.inner.lock().unwrap();
        inner
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or(LedgerError::NotFound(wallet_id))
    }

    async fn execute_mutation(
        &self,
        request: MutationRequest,
        limits: &Limits,
        correlation_id: &str,
    ) -> Result<MutationOutcome, LedgerError> {
        let mut inner = self.inner.lock().unwrap();

        match request {
            MutationRequest::Deposit {
                wallet_id,
                caller_user_id,
                amount,
                idempotency_key,
                metadata,
            } => {
                let wallet = inner
                    .wallets
                    .get(&wallet_id)
                    .cloned()
                    .ok_or(LedgerError::NotFound(wallet_id))?;
                validate_ownership(&wallet, &caller_user_id)?;
                validate_active(&wallet)?;
                validate_limits(limits, wallet.currency, amount, wallet.balance.checked_add(amount)?)?;

                let balance_before = wallet.balance;
                let balance_after = balance_before.checked_add(amount)?;

                let entry = build_entry(
                    wallet_id,
                    None,
                    JournalEntryType::Deposit,
                    amount,
                    wallet.currency,
                    balance_before,
                    balance_after,
                    idempotency_key.clone(),
                    metadata,
                );

                let payload = funds_movement_payload(event_kind::FUNDS_DEPOSITED, &entry, correlation_id);
                commit_mutation(
                    &mut inner,
                    wallet_id,
                    balance_after,
                    vec![entry.clone()],
                    vec![(event_kind::FUNDS_DEPOSITED.to_string(), entry.id, payload)],
                )
            }

            MutationRequest::Withdraw {
                wallet_id,
                caller_user_id,
                amount,
                idempotency_key,
                metadata,
            } => {
                let wallet = inner
                    .wallets
                    .get(&wallet_id)
                    .cloned()
                    .ok_or(LedgerError::NotFound(wallet_id))?;
                validate_ownership(&wallet, &caller_user_id)?;
                validate_active(&wallet)?;
                validate_limit_amount(limits, wallet.currency, amount)?;

                if wallet.balance < amount {
                    return Err(LedgerError::InsufficientFunds {
                        requested: amount,
                        available: wallet.balance,
                    });
                }

                let balance_before = wallet.balance;
                let balance_after = balance_before.checked_sub(amount)?;

                let entry = build_entry(
                    wallet_id,
                    None,
                    JournalEntryType::Withdrawal,
                    amount,
                    wallet.currency,
                    balance_before,
                    balance_after,
                    idempotency_key.clone(),
                    metadata,
                );

                let payload = funds_movement_payload(event_kind::FUNDS_WITHDRAWN, &entry, correlation_id);
                commit_mutation(
                    &mut inner,
                    wallet_id,
                    balance_after,
                    vec![entry.clone()],
                    vec![(event_kind::FUNDS_WITHDRAWN.to_string(), entry.id, payload)],
                )
            }

            MutationRequest::Transfer {
                source_wallet_id,
                destination_wallet_id,
                caller_user_id,
                amount,
                idempotency_key,
                metadata,
            } => {
                if source_wallet_id == destination_wallet_id {
                    return Err(LedgerError::InvalidTransfer(
                        "source and destination wallets must differ".into(),
                    ));
                }

                // The single store-wide mutex already serializes this call;
                // the Postgres adapter is where ascending-wallet-id lock
                // ordering actually matters.
                let source = inner
                    .wallets
                    .get(&source_wallet_id)
                    .cloned()
                    .ok_or(LedgerError::NotFound(source_wallet_id))?;
                let destination = inner
                    .wallets
                    .get(&destination_wallet_id)
                    .cloned()
                    .ok_or(LedgerError::NotFound(destination_wallet_id))?;

                validate_ownership(&source, &caller_user_id)?;
                validate_active(&source)?;
                validate_active(&destination)?;
                if source.currency != destination.currency {
                    return Err(LedgerError::CurrencyMismatch);
                }
                validate_limit_amount(limits, source.currency, amount)?;

                if source.balance < amount {
                    return Err(LedgerError::InsufficientFunds {
                        requested: amount,
                        available: source.balance,
                    });
                }

                let source_balance_after = source.balance.checked_sub(amount)?;
                let destination_balance_after = destination.balance.checked_add(amount)?;
                validate_limits(
                    limits,
                    destination.currency,
                    amount,
                    destination_balance_after,
                )?;

                let transfer_id = Uuid::now_v7();
                let debit_metadata = with_transfer_id(metadata.clone(), transfer_id);
                let credit_metadata = with_transfer_id(metadata, transfer_id);

                let debit_entry = build_entry(
                    source_wallet_id,
                    Some(destination_wallet_id),
                    JournalEntryType::TransferDebit,
                    amount,
                    source.currency,
                    source.balance,
                    source_balance_after,
                    idempotency_key.clone(),
                    Some(debit_metadata),
                );
                let credit_entry = build_entry(
                    destination_wallet_id,
                    Some(source_wallet_id),
                    JournalEntryType::TransferCredit,
                    amount,
                    destination.currency,
                    destination.balance,
                    destination_balance_after,
                    None,
                    Some(credit_metadata),
                );

                let debit_payload = transfer_leg_payload(
                    event_kind::FUNDS_TRANSFER_DEBITED,
                    source_wallet_id,
                    destination_wallet_id,
                    transfer_id,
                    &debit_entry,
                    correlation_id,
                );
                let credit_payload = transfer_leg_payload(
                    event_kind::FUNDS_TRANSFER_CREDITED,
                    source_wallet_id,
                    destination_wallet_id,
                    transfer_id,
                    &credit_entry,
                    correlation_id,
                );

                inner.wallets.get_mut(&source_wallet_id).unwrap().balance = source_balance_after;
                inner.wallets.get_mut(&source_wallet_id).unwrap().updated_at = Utc::now();
                inner.wallets.get_mut(&destination_wallet_id).unwrap().balance = destination_balance_after;
                inner.wallets.get_mut(&destination_wallet_id).unwrap().updated_at = Utc::now();

                if let Some(key) = &debit_entry.idempotency_key {
                    inner
                        .journal_by_idempotency_key
                        .insert(key.clone(), debit_entry.id);
                }
                inner.journal.insert(debit_entry.id, debit_entry.clone());
                inner.journal.insert(credit_entry.id, credit_entry.clone());

                let mut outbox_entries = Vec::new();
                for (event_type, aggregate_id, payload) in [
                    (
                        event_kind::FUNDS_TRANSFER_DEBITED.to_string(),
                        transfer_id,
                        debit_payload,
                    ),
                    (
                        event_kind::FUNDS_TRANSFER_CREDITED.to_string(),
                        transfer_id,
                        credit_payload,
                    ),
                ] {
                    inner.next_outbox_id += 1;
                    let entry = OutboxEntry {
                        id: inner.next_outbox_id,
                        event_type,
                        aggregate_id,
                        payload,
                        published: false,
                        published_at: None,
                        created_at: Utc::now(),
                    };
                    inner.outbox.push(entry.clone());
                    outbox_entries.push(entry);
                }

                Ok(MutationOutcome {
                    entries: vec![debit_entry, credit_entry],
                    outbox_entries,
                })
            }
        }
    }

    async fn find_journal_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<JournalEntry>, LedgerError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .journal_by_idempotency_key
            .get(idempotency_key)
            .and_then(|id| inner.journal.get(id))
            .cloned())
    }

    async fn find_transfer_legs(
        &self,
        transfer_id: Uuid,
    ) -> Result<Option<(JournalEntry, JournalEntry)>, LedgerError> {
        let inner = self.inner.lock().unwrap();
        let mut debit = None;
        let mut credit = None;
        for entry in inner.journal.values() {
            if entry.transfer_id() == Some(transfer_id) {
                match entry.entry_type {
                    JournalEntryType::TransferDebit => debit = Some(entry.clone()),
                    JournalEntryType::TransferCredit => credit = Some(entry.clone()),
                    _ => {}
                }
            }
        }
        Ok(debit.zip(credit))
    }

    async fn list_journal_entries(
        &self,
        wallet_id: Uuid,
        filter: JournalFilter,
        pagination: Pagination,
    ) -> Result<JournalPage, LedgerError> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<JournalEntry> = inner
            .journal
            .values()
            .filter(|e| e.wallet_id == wallet_id)
            .filter(|e| filter.entry_type.is_none_or(|t| t == e.entry_type))
            .filter(|e| filter.created_from.is_none_or(|from| e.created_at >= from))
            .filter(|e| filter.created_to.is_none_or(|to| e.created_at < to))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total_items = matching.len() as u64;
        let page_size = pagination.page_size.max(1) as u64;
        let total_pages = total_items.div_ceil(page_size).max(1);

        let start = ((pagination.page.max(1) as u64 - 1) * page_size) as usize;
        let end = (start + page_size as usize).min(matching.len());
        let entries = if start >= matching.len() {
            Vec::new()
        } else {
            matching[start..end].to_vec()
        };

        Ok(JournalPage {
            entries,
            total_items,
            total_pages,
        })
    }

    async fn fetch_unpublished_outbox(&self, batch_size: u32) -> Result<Vec<OutboxEntry>, LedgerError> {
        let inner = self.inner.lock().unwrap();
        let mut unpublished: Vec<OutboxEntry> = inner.outbox.iter().filter(|e| !e.published).cloned().collect();
        unpublished.sort_by_key(|e| e.id);
        unpublished.truncate(batch_size as usize);
        Ok(unpublished)
    }

    async fn mark_outbox_published(&self, ids: &[i64]) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        for entry in inner.outbox.iter_mut() {
            if ids.contains(&entry.id) {
                entry.published = true;
                entry.published_at = Some(now);
            }
        }
        Ok(())
    }
}

fn validate_ownership(wallet: &Wallet, caller_user_id: &str) -> Result<(), LedgerError> {
    if !wallet.is_owned_by(caller_user_id) {
        return Err(LedgerError::Forbidden);
    }
    Ok(())
}

fn validate_active(wallet: &Wallet) -> Result<(), LedgerError> {
    if wallet.status != WalletStatus::Active {
        return Err(LedgerError::InvalidState(format!(
            "wallet is {}",
            wallet.status.as_str()
        )));
    }
    Ok(())
}

fn validate_limit_amount(
    limits: &Limits,
    currency: Currency,
    amount: crate::money::Money,
) -> Result<(), LedgerError> {
    let max_tx = limits.max_transaction_amount(currency);
    if amount > max_tx {
        return Err(LedgerError::AmountExceedsLimit { amount, limit: max_tx });
    }
    Ok(())
}

fn validate_limits(
    limits: &Limits,
    currency: Currency,
    amount: crate::money::Money,
    resulting_balance: crate::money::Money,
) -> Result<(), LedgerError> {
    validate_limit_amount(limits, currency, amount)?;
    let max_balance = limits.max_wallet_balance(currency);
    if resulting_balance > max_balance {
        return Err(LedgerError::BalanceExceedsLimit {
            new_balance: resulting_balance,
            limit: max_balance,
        });
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_entry(
    wallet_id: Uuid,
    related_wallet_id: Option<Uuid>,
    entry_type: JournalEntryType,
    amount: crate::money::Money,
    currency: Currency,
    balance_before: crate::money::Money,
    balance_after: crate::money::Money,
    idempotency_key: Option<String>,
    metadata: Option<serde_json::Value>,
) -> JournalEntry {
    JournalEntry {
        id: Uuid::now_v7(),
        wallet_id,
        related_wallet_id,
        entry_type,
        amount,
        currency,
        balance_before,
        balance_after,
        status: JournalStatus::Completed,
        idempotency_key,
        metadata,
        created_at: Utc::now(),
    }
}

fn with_transfer_id(metadata: Option<serde_json::Value>, transfer_id: Uuid) -> serde_json::Value {
    let mut map = match metadata {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    map.insert(
        "transfer_id".to_string(),
        serde_json::Value::String(transfer_id.to_string()),
    );
    serde_json::Value::Object(map)
}

fn commit_mutation(
    inner: &mut Inner,
    wallet_id: Uuid,
    balance_after: crate::money::Money,
    entries: Vec<JournalEntry>,
    outbox: Vec<(String, Uuid, serde_json::Value)>,
) -> Result<MutationOutcome, LedgerError> {
    if let Some(key) = entries[0].idempotency_key.clone() {
        inner.journal_by_idempotency_key.insert(key, entries[0].id);
    }
    for entry in &entries {
        inner.journal.insert(entry.id, entry.clone());
    }
    let wallet = inner.wallets.get_mut(&wallet_id).unwrap();
    wallet.balance = balance_after;
    wallet.updated_at = Utc::now();

    let mut outbox_entries = Vec::new();
    for (event_type, aggregate_id, payload) in outbox {
        inner.next_outbox_id += 1;
        let entry = OutboxEntry {
            id: inner.next_outbox_id,
            event_type,
            aggregate_id,
            payload,
            published: false,
            published_at: None,
            created_at: Utc::now(),
        };
        inner.outbox.push(entry.clone());
        outbox_entries.push(entry);
    }

    Ok(MutationOutcome { entries, outbox_entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;

    #[tokio::test]
    async fn mutation_on_a_frozen_wallet_is_rejected() {
        let store = MemoryStore::new();
        let wallet = store.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();
        store.set_wallet_status(wallet.id, WalletStatus::Frozen);

        let err = store
            .execute_mutation(
                MutationRequest::Deposit {
                    wallet_id: wallet.id,
                    caller_user_id: "alice".to_string(),
                    amount: Money::parse("10.00").unwrap(),
                    idempotency_key: None,
                    metadata: None,
                },
                &Limits::for_tests(),
                "corr-1",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InvalidState(_)));
    }

    #[tokio::test]
    async fn mutation_on_a_closed_wallet_is_rejected() {
        let store = MemoryStore::new();
        let wallet = store.create_wallet("alice", Currency::Usd, "corr-0").await.unwrap();
        store.set_wallet_status(wallet.id, WalletStatus::Closed);

        let err = store
            .execute_mutation(
                MutationRequest::Withdraw {
                    wallet_id: wallet.id,
                    caller_user_id: "alice".to_string(),
                    amount: Money::parse("1.00").unwrap(),
                    idempotency_key: None,
                    metadata: None,
                },
                &Limits::for_tests(),
                "corr-1",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InvalidState(_)));
    }
}
