use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;
use crate::wallet::Currency;

/// The kind of balance movement a journal entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEntryType {
    Deposit,
    Withdrawal,
    TransferDebit,
    TransferCredit,
}

impl JournalEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalEntryType::Deposit => "deposit",
            JournalEntryType::Withdrawal => "withdrawal",
            JournalEntryType::TransferDebit => "transfer_debit",
            JournalEntryType::TransferCredit => "transfer_credit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deposit" => Some(JournalEntryType::Deposit),
            "withdrawal" => Some(JournalEntryType::Withdrawal),
            "transfer_debit" => Some(JournalEntryType::TransferDebit),
            "transfer_credit" => Some(JournalEntryType::TransferCredit),
            _ => None,
        }
    }

    /// Whether this movement type increases (`true`) or decreases (`false`)
    /// the wallet's balance. Used by the balance-reconstruction property.
    pub fn is_credit(&self) -> bool {
        matches!(self, JournalEntryType::Deposit | JournalEntryType::TransferCredit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Pending,
    Completed,
    Failed,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalStatus::Pending => "pending",
            JournalStatus::Completed => "completed",
            JournalStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JournalStatus::Pending),
            "completed" => Some(JournalStatus::Completed),
            "failed" => Some(JournalStatus::Failed),
            _ => None,
        }
    }
}

/// An immutable record of one balance movement on one wallet. A transfer
/// produces two entries (debit and credit), sharing one synthesized
/// `transfer_id` carried in `metadata["transfer_id"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub related_wallet_id: Option<Uuid>,
    pub entry_type: JournalEntryType,
    pub amount: Money,
    pub currency: Currency,
    pub balance_before: Money,
    pub balance_after: Money,
    pub status: JournalStatus,
    pub idempotency_key: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Hashes a caller-supplied idempotency token before it is used as a store
/// index key. Bounds key length and avoids persisting raw caller-chosen
/// tokens verbatim in an index; the engine hashes at this boundary so every
/// [`LedgerStore`](crate::store::LedgerStore) implementation stays agnostic
/// to the original token.
pub fn hash_idempotency_key(raw: &str) -> String {
    blake3::hash(raw.as_bytes()).to_hex().to_string()
}

impl JournalEntry {
    /// The `transfer_id` embedded in `metadata`, if this entry is one leg of
    /// a transfer.
    pub fn transfer_id(&self) -> Option<Uuid> {
        self.metadata
            .as_ref()?
            .get("transfer_id")?
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}
