use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::Limits;
use crate::error::LedgerError;
use crate::journal::{JournalEntry, JournalEntryType, JournalStatus};
use crate::money::Money;
use crate::outbox::{
    event_kind, funds_movement_payload, transfer_leg_payload, wallet_created_payload, OutboxEntry,
};
use crate::wallet::{Currency, Wallet, WalletStatus};

use super::{JournalFilter, JournalPage, LedgerStore, MutationOutcome, MutationRequest, Pagination};

/// Postgres-backed [`LedgerStore`]. Every query is a hand-written
/// `sqlx::query(...)` with positional `$n` binds and `row.try_get::<T, _>(..)`
/// extraction. No compile-time query macros, since those require a live
/// database at build time.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn init_schema(&self) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallets (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL CHECK (char_length(user_id) BETWEEN 1 AND 255),
                balance NUMERIC(19,4) NOT NULL CHECK (balance >= 0),
                currency TEXT NOT NULL CHECK (currency IN ('USD', 'EUR', 'GBP')),
                status TEXT NOT NULL CHECK (status IN ('active', 'frozen', 'closed')),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                version BIGINT NOT NULL DEFAULT 0,
                UNIQUE (user_id, currency)
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journal_entries (
                id UUID PRIMARY KEY,
                wallet_id UUID NOT NULL REFERENCES wallets(id) ON DELETE RESTRICT,
                related_wallet_id UUID REFERENCES wallets(id) ON DELETE RESTRICT,
                type TEXT NOT NULL CHECK (type IN ('deposit', 'withdrawal', 'transfer_debit', 'transfer_credit')),
                amount NUMERIC(19,4) NOT NULL CHECK (amount > 0),
                currency TEXT NOT NULL CHECK (currency IN ('USD', 'EUR', 'GBP')),
                balance_before NUMERIC(19,4) NOT NULL,
                balance_after NUMERIC(19,4) NOT NULL CHECK (balance_after >= 0),
                status TEXT NOT NULL CHECK (status IN ('pending', 'completed', 'failed')),
                idempotency_key TEXT,
                metadata JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_journal_wallet_created
            ON journal_entries(wallet_id, created_at DESC)
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_journal_idempotency_key
            ON journal_entries(idempotency_key)
            WHERE idempotency_key IS NOT NULL
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox_entries (
                id BIGSERIAL PRIMARY KEY,
                event_type TEXT NOT NULL,
                aggregate_id UUID NOT NULL,
                payload JSONB NOT NULL,
                published BOOLEAN NOT NULL DEFAULT FALSE,
                published_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_outbox_unpublished
            ON outbox_entries(created_at)
            WHERE published = FALSE
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn create_wallet(
        &self,
        user_id: &str,
        currency: Currency,
        correlation_id: &str,
    ) -> Result<Wallet, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let wallet = Wallet::new(user_id.to_string(), currency);

        let inserted = sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, balance, currency, status, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, currency) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(wallet.id)
        .bind(&wallet.user_id)
        .bind(money_to_decimal(wallet.balance)?)
        .bind(wallet.currency.as_str())
        .bind(wallet.status.as_str())
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .bind(wallet.version)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            tx.rollback().await.ok();
            return Err(LedgerError::Conflict(format!(
                "wallet already exists for user {user_id} in {}",
                currency.as_str()
            )));
        }

        let payload = wallet_created_payload(&wallet, correlation_id);
        insert_outbox_row(&mut tx, event_kind::WALLET_CREATED, wallet.id, &payload).await?;

        tx.commit().await?;
        Ok(wallet)
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Wallet, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, balance, currency, status, created_at, updated_at, version
            FROM wallets WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row_to_wallet(&row)?),
            None => Err(LedgerError::NotFound(wallet_id)),
        }
    }

    async fn execute_mutation(
        &self,
        request: MutationRequest,
        limits: &Limits,
        correlation_id: &str,
    ) -> Result<MutationOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let outcome = match request {
            MutationRequest::Deposit {
                wallet_id,
                caller_user_id,
                amount,
                idempotency_key,
                metadata,
            } => {
                let wallet = lock_wallet(&mut tx, wallet_id).await?;
                validate_ownership(&wallet, &caller_user_id)?;
                validate_active(&wallet)?;
                let balance_after = wallet.balance.checked_add(amount)?;
                validate_limits(limits, wallet.currency, amount, balance_after)?;

                let entry = insert_journal_row(
                    &mut tx,
                    wallet_id,
                    None,
                    JournalEntryType::Deposit,
                    amount,
                    wallet.currency,
                    wallet.balance,
                    balance_after,
                    idempotency_key,
                    metadata,
                )
                .await?;
                update_wallet_balance(&mut tx, wallet_id, balance_after).await?;

                let payload = funds_movement_payload(event_kind::FUNDS_DEPOSITED, &entry, correlation_id);
                let outbox_entry =
                    insert_outbox_row(&mut tx, event_kind::FUNDS_DEPOSITED, entry.id, &payload).await?;

                MutationOutcome {
                    entries: vec![entry],
                    outbox_entries: vec![outbox_entry],
                }
            }

            MutationRequest::Withdraw {
                wallet_id,
                caller_user_id,
                amount,
                idempotency_key,
                metadata,
            } => {
                let wallet = lock_wallet(&mut tx, wallet_id).await?;
                validate_ownership(&wallet, &caller_user_id)?;
                validate_active(&wallet)?;
                validate_limit_amount(limits, wallet.currency, amount)?;

                if wallet.balance < amount {
                    tx.rollback().await.ok();
                    return Err(LedgerError::InsufficientFunds {
                        requested: amount,
                        available: wallet.balance,
                    });
                }
                let balance_after = wallet.balance.checked_sub(amount)?;

                let entry = insert_journal_row(
                    &mut tx,
                    wallet_id,
                    None,
                    JournalEntryType::Withdrawal,
                    amount,
                    wallet.currency,
                    wallet.balance,
                    balance_after,
                    idempotency_key,
                    metadata,
                )
                .await?;
                update_wallet_balance(&mut tx, wallet_id, balance_after).await?;

                let payload = funds_movement_payload(event_kind::FUNDS_WITHDRAWN, &entry, correlation_id);
                let outbox_entry =
                    insert_outbox_row(&mut tx, event_kind::FUNDS_WITHDRAWN, entry.id, &payload).await?;

                MutationOutcome {
                    entries: vec![entry],
                    outbox_entries: vec![outbox_entry],
                }
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
                    tx.rollback().await.ok();
                    return Err(LedgerError::InvalidTransfer(
                        "source and destination wallets must differ".into(),
                    ));
                }

                // Deterministic ascending-wallet-id lock order: total across
                // any pair of wallets, so concurrent A->B and B->A transfers
                // cannot deadlock.
                let (first_id, second_id) = if source_wallet_id < destination_wallet_id {
                    (source_wallet_id, destination_wallet_id)
                } else {
                    (destination_wallet_id, source_wallet_id)
                };
                let first = lock_wallet(&mut tx, first_id).await?;
                let second = lock_wallet(&mut tx, second_id).await?;
                let (source, destination) = if first_id == source_wallet_id {
                    (first, second)
                } else {
                    (second, first)
                };

                validate_ownership(&source, &caller_user_id)?;
                validate_active(&source)?;
                validate_active(&destination)?;
                if source.currency != destination.currency {
                    tx.rollback().await.ok();
                    return Err(LedgerError::CurrencyMismatch);
                }
                validate_limit_amount(limits, source.currency, amount)?;

                if source.balance < amount {
                    tx.rollback().await.ok();
                    return Err(LedgerError::InsufficientFunds {
                        requested: amount,
                        available: source.balance,
                    });
                }

                let source_balance_after = source.balance.checked_sub(amount)?;
                let destination_balance_after = destination.balance.checked_add(amount)?;
                validate_limits(limits, destination.currency, amount, destination_balance_after)?;

                let transfer_id = Uuid::now_v7();
                let debit_metadata = with_transfer_id(metadata.clone(), transfer_id);
                let credit_metadata = with_transfer_id(metadata, transfer_id);

                let debit_entry = insert_journal_row(
                    &mut tx,
                    source_wallet_id,
                    Some(destination_wallet_id),
                    JournalEntryType::TransferDebit,
                    amount,
                    source.currency,
                    source.balance,
                    source_balance_after,
                    idempotency_key,
                    Some(debit_metadata),
                )
                .await?;
                let credit_entry = insert_journal_row(
                    &mut tx,
                    destination_wallet_id,
                    Some(source_wallet_id),
                    JournalEntryType::TransferCredit,
                    amount,
                    destination.currency,
                    destination.balance,
                    destination_balance_after,
                    None,
                    Some(credit_metadata),
                )
                .await?;

                update_wallet_balance(&mut tx, source_wallet_id, source_balance_after).await?;
                update_wallet_balance(&mut tx, destination_wallet_id, destination_balance_after).await?;

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

                let debit_outbox =
                    insert_outbox_row(&mut tx, event_kind::FUNDS_TRANSFER_DEBITED, transfer_id, &debit_payload)
                        .await?;
                let credit_outbox = insert_outbox_row(
                    &mut tx,
                    event_kind::FUNDS_TRANSFER_CREDITED,
                    transfer_id,
                    &credit_payload,
                )
                .await?;

                MutationOutcome {
                    entries: vec![debit_entry, credit_entry],
                    outbox_entries: vec![debit_outbox, credit_outbox],
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn find_journal_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<JournalEntry>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, wallet_id, related_wallet_id, type, amount, currency,
                   balance_before, balance_after, status, idempotency_key, metadata, created_at
            FROM journal_entries WHERE idempotency_key = $1
            "#,
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_journal_entry(&r)).transpose()
    }

    async fn find_transfer_legs(
        &self,
        transfer_id: Uuid,
    ) -> Result<Option<(JournalEntry, JournalEntry)>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, wallet_id, related_wallet_id, type, amount, currency,
                   balance_before, balance_after, status, idempotency_key, metadata, created_at
            FROM journal_entries
            WHERE metadata->>'transfer_id' = $1
            "#,
        )
        .bind(transfer_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut debit = None;
        let mut credit = None;
        for row in rows {
            let entry = row_to_journal_entry(&row)?;
            match entry.entry_type {
                JournalEntryType::TransferDebit => debit = Some(entry),
                JournalEntryType::TransferCredit => credit = Some(entry),
                _ => {}
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
        let entry_type = filter.entry_type.map(|t| t.as_str().to_string());
        let offset = ((pagination.page.max(1) - 1) * pagination.page_size.max(1)) as i64;
        let limit = pagination.page_size.max(1) as i64;

        let rows = sqlx::query(
            r#"
            SELECT id, wallet_id, related_wallet_id, type, amount, currency,
                   balance_before, balance_after, status, idempotency_key, metadata, created_at
            FROM journal_entries
            WHERE wallet_id = $1
              AND ($2::TEXT IS NULL OR type = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR created_at < $4)
            ORDER BY created_at DESC
            OFFSET $5 LIMIT $6
            "#,
        )
        .bind(wallet_id)
        .bind(&entry_type)
        .bind(filter.created_from)
        .bind(filter.created_to)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .iter()
            .map(row_to_journal_entry)
            .collect::<Result<Vec<_>, _>>()?;

        let total_items: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM journal_entries
            WHERE wallet_id = $1
              AND ($2::TEXT IS NULL OR type = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR created_at < $4)
            "#,
        )
        .bind(wallet_id)
        .bind(&entry_type)
        .bind(filter.created_from)
        .bind(filter.created_to)
        .fetch_one(&self.pool)
        .await?
        .try_get("count")?;

        let total_items = total_items as u64;
        let page_size = pagination.page_size.max(1) as u64;
        let total_pages = total_items.div_ceil(page_size).max(1);

        Ok(JournalPage {
            entries,
            total_items,
            total_pages,
        })
    }

    async fn fetch_unpublished_outbox(&self, batch_size: u32) -> Result<Vec<OutboxEntry>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_id, payload, published, published_at, created_at
            FROM outbox_entries
            WHERE published = FALSE
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(batch_size as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_outbox_entry).collect()
    }

    async fn mark_outbox_published(&self, ids: &[i64]) -> Result<(), LedgerError> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            UPDATE outbox_entries
            SET published = TRUE, published_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn lock_wallet(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    wallet_id: Uuid,
) -> Result<Wallet, LedgerError> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, balance, currency, status, created_at, updated_at, version
        FROM wallets WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(wallet_id)
    .fetch_optional(&mut **tx)
    .await?;

    match row {
        Some(row) => row_to_wallet(&row),
        None => {
            tx.rollback().await.ok();
            Err(LedgerError::NotFound(wallet_id))
        }
    }
}

async fn update_wallet_balance(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    wallet_id: Uuid,
    balance_after: Money,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        UPDATE wallets SET balance = $1, updated_at = NOW(), version = version + 1
        WHERE id = $2
        "#,
    )
    .bind(money_to_decimal(balance_after)?)
    .bind(wallet_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn insert_journal_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    wallet_id: Uuid,
    related_wallet_id: Option<Uuid>,
    entry_type: JournalEntryType,
    amount: Money,
    currency: Currency,
    balance_before: Money,
    balance_after: Money,
    idempotency_key: Option<String>,
    metadata: Option<serde_json::Value>,
) -> Result<JournalEntry, LedgerError> {
    let entry = JournalEntry {
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
    };

    sqlx::query(
        r#"
        INSERT INTO journal_entries
            (id, wallet_id, related_wallet_id, type, amount, currency,
             balance_before, balance_after, status, idempotency_key, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(entry.id)
    .bind(entry.wallet_id)
    .bind(entry.related_wallet_id)
    .bind(entry.entry_type.as_str())
    .bind(money_to_decimal(entry.amount)?)
    .bind(entry.currency.as_str())
    .bind(money_to_decimal(entry.balance_before)?)
    .bind(money_to_decimal(entry.balance_after)?)
    .bind(entry.status.as_str())
    .bind(&entry.idempotency_key)
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(entry)
}

async fn insert_outbox_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event_type: &str,
    aggregate_id: Uuid,
    payload: &serde_json::Value,
) -> Result<OutboxEntry, LedgerError> {
    let row = sqlx::query(
        r#"
        INSERT INTO outbox_entries (event_type, aggregate_id, payload, published, created_at)
        VALUES ($1, $2, $3, FALSE, NOW())
        RETURNING id, event_type, aggregate_id, payload, published, published_at, created_at
        "#,
    )
    .bind(event_type)
    .bind(aggregate_id)
    .bind(payload)
    .fetch_one(&mut **tx)
    .await?;

    row_to_outbox_entry(&row)
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

fn validate_limit_amount(limits: &Limits, currency: Currency, amount: Money) -> Result<(), LedgerError> {
    let max_tx = limits.max_transaction_amount(currency);
    if amount > max_tx {
        return Err(LedgerError::AmountExceedsLimit { amount, limit: max_tx });
    }
    Ok(())
}

fn validate_limits(
    limits: &Limits,
    currency: Currency,
    amount: Money,
    resulting_balance: Money,
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

/// Converts the engine's scaled-integer [`Money`] into the `rust_decimal`
/// value `sqlx` binds against a `NUMERIC(19,4)` column.
fn money_to_decimal(amount: Money) -> Result<Decimal, LedgerError> {
    Decimal::from_str(&amount.to_internal_string())
        .map_err(|e| LedgerError::Internal(format!("money to decimal conversion: {e}")))
}

fn row_to_wallet(row: &sqlx::postgres::PgRow) -> Result<Wallet, LedgerError> {
    let balance: Decimal = row.try_get("balance")?;
    let currency_str: String = row.try_get("currency")?;
    let status_str: String = row.try_get("status")?;

    Ok(Wallet {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        balance: Money::parse(&balance.to_string())?,
        currency: Currency::parse(&currency_str)
            .ok_or_else(|| LedgerError::Internal(format!("unknown currency '{currency_str}'")))?,
        status: WalletStatus::parse(&status_str)
            .ok_or_else(|| LedgerError::Internal(format!("unknown wallet status '{status_str}'")))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

fn row_to_journal_entry(row: &sqlx::postgres::PgRow) -> Result<JournalEntry, LedgerError> {
    let amount: Decimal = row.try_get("amount")?;
    let balance_before: Decimal = row.try_get("balance_before")?;
    let balance_after: Decimal = row.try_get("balance_after")?;
    let type_str: String = row.try_get("type")?;
    let currency_str: String = row.try_get("currency")?;
    let status_str: String = row.try_get("status")?;

    Ok(JournalEntry {
        id: row.try_get("id")?,
        wallet_id: row.try_get("wallet_id")?,
        related_wallet_id: row.try_get("related_wallet_id")?,
        entry_type: JournalEntryType::parse(&type_str)
            .ok_or_else(|| LedgerError::Internal(format!("unknown journal type '{type_str}'")))?,
        amount: Money::parse(&amount.to_string())?,
        currency: Currency::parse(&currency_str)
            .ok_or_else(|| LedgerError::Internal(format!("unknown currency '{currency_str}'")))?,
        balance_before: Money::parse(&balance_before.to_string())?,
        balance_after: Money::parse(&balance_after.to_string())?,
        status: JournalStatus::parse(&status_str)
            .ok_or_else(|| LedgerError::Internal(format!("unknown journal status '{status_str}'")))?,
        idempotency_key: row.try_get("idempotency_key")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_outbox_entry(row: &sqlx::postgres::PgRow) -> Result<OutboxEntry, LedgerError> {
    Ok(OutboxEntry {
        id: row.try_get("id")?,
        event_type: row.try_get("event_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        payload: row.try_get("payload")?,
        published: row.try_get("published")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
    })
}
