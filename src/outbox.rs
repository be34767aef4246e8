use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pending event, co-written with its journal entry in the same database
/// transaction. Never deleted; the relay only ever flips `published`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Event kind strings, exactly the set named in the external-interfaces
/// event-payload shape.
pub mod event_kind {
    pub const WALLET_CREATED: &str = "wallet.created";
    pub const FUNDS_DEPOSITED: &str = "funds.deposited";
    pub const FUNDS_WITHDRAWN: &str = "funds.withdrawn";
    pub const FUNDS_TRANSFER_DEBITED: &str = "funds.transfer.debited";
    pub const FUNDS_TRANSFER_CREDITED: &str = "funds.transfer.credited";
}

use crate::journal::JournalEntry;
use crate::wallet::Wallet;

/// Builds the `wallet.created` event payload.
pub fn wallet_created_payload(wallet: &Wallet, correlation_id: &str) -> serde_json::Value {
    serde_json::json!({
        "event_type": event_kind::WALLET_CREATED,
        "timestamp": Utc::now().to_rfc3339(),
        "correlation_id": correlation_id,
        "wallet_id": wallet.id,
        "user_id": wallet.user_id,
        "currency": wallet.currency.as_str(),
        "initial_balance": wallet.balance.to_display_string(),
    })
}

/// Builds the `funds.deposited` / `funds.withdrawn` event payload.
pub fn funds_movement_payload(
    event_type: &str,
    entry: &JournalEntry,
    correlation_id: &str,
) -> serde_json::Value {
    serde_json::json!({
        "event_type": event_type,
        "timestamp": Utc::now().to_rfc3339(),
        "correlation_id": correlation_id,
        "wallet_id": entry.wallet_id,
        "transaction_id": entry.id,
        "amount": entry.amount.to_display_string(),
        "currency": entry.currency.as_str(),
        "previous_balance": entry.balance_before.to_display_string(),
        "new_balance": entry.balance_after.to_display_string(),
        "metadata": entry.metadata,
    })
}

/// Builds the `funds.transfer.debited` / `funds.transfer.credited` event
/// payload for one leg of a transfer.
#[allow(clippy::too_many_arguments)]
pub fn transfer_leg_payload(
    event_type: &str,
    source_wallet_id: Uuid,
    destination_wallet_id: Uuid,
    transfer_id: Uuid,
    leg: &JournalEntry,
    correlation_id: &str,
) -> serde_json::Value {
    serde_json::json!({
        "event_type": event_type,
        "timestamp": Utc::now().to_rfc3339(),
        "correlation_id": correlation_id,
        "source_wallet_id": source_wallet_id,
        "destination_wallet_id": destination_wallet_id,
        "transfer_id": transfer_id,
        "transaction_id": leg.id,
        "amount": leg.amount.to_display_string(),
        "currency": leg.currency.as_str(),
        "previous_balance": leg.balance_before.to_display_string(),
        "new_balance": leg.balance_after.to_display_string(),
        "metadata": leg.metadata,
    })
}
