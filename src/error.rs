use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::money::Money;

/// The closed error taxonomy the core raises across its boundary.
///
/// Every public engine operation returns either its success payload or one of
/// these variants. Store-specific errors (`sqlx::Error`, constraint-violation
/// codes) are mapped to a variant here at the store-adapter boundary and never
/// cross it unmapped.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: caller does not own this wallet")]
    Forbidden,

    #[error("wallet {0} not found")]
    NotFound(uuid::Uuid),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Money, available: Money },

    #[error("currency mismatch")]
    CurrencyMismatch,

    #[error("amount {amount} exceeds configured limit {limit}")]
    AmountExceedsLimit { amount: Money, limit: Money },

    #[error("resulting balance {new_balance} exceeds configured limit {limit}")]
    BalanceExceedsLimit { new_balance: Money, limit: Money },

    #[error("invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("wallet is not active: {0}")]
    InvalidState(String),

    #[error("rate limit exceeded, resets at {reset_at}")]
    RateLimitExceeded { reset_at: DateTime<Utc> },

    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// The closed taxonomy code, stable across versions, suitable for glue-layer
    /// HTTP status mapping (out of scope for this crate).
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation",
            LedgerError::Unauthorized => "unauthorized",
            LedgerError::Forbidden => "forbidden",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::CurrencyMismatch => "currency_mismatch",
            LedgerError::AmountExceedsLimit { .. } => "amount_exceeds_limit",
            LedgerError::BalanceExceedsLimit { .. } => "balance_exceeds_limit",
            LedgerError::InvalidTransfer(_) => "invalid_transfer",
            LedgerError::InvalidState(_) => "invalid_state",
            LedgerError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            LedgerError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return LedgerError::Conflict(db_err.message().to_string());
            }
            if db_err.is_check_violation() {
                // `balance >= 0` is a last line of defense; the engine validates
                // funds before issuing the update, so this only fires under a
                // race the application-level check missed. Other CHECK
                // constraints (user_id length, currency/status enums) are
                // guarded earlier by engine validation and should not occur.
                return match db_err.constraint() {
                    Some(name) if name.contains("balance") => LedgerError::InsufficientFunds {
                        requested: Money::ZERO,
                        available: Money::ZERO,
                    },
                    _ => LedgerError::Validation(db_err.message().to_string()),
                };
            }
        }
        LedgerError::Internal(err.to_string())
    }
}
