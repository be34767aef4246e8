use std::collections::HashMap;
use std::time::Duration;

use crate::money::Money;
use crate::wallet::Currency;

/// Per-currency transaction/balance ceilings, keyed by currency code.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_transaction_amount: HashMap<Currency, Money>,
    pub max_wallet_balance: HashMap<Currency, Money>,
}

impl Limits {
    fn from_env() -> Self {
        let mut max_transaction_amount = HashMap::new();
        let mut max_wallet_balance = HashMap::new();

        for currency in [Currency::Usd, Currency::Eur, Currency::Gbp] {
            let code = currency.as_str();
            let tx_limit = env_money(&format!("LEDGER_MAX_TX_AMOUNT_{code}"), "1000000.00");
            let balance_limit = env_money(&format!("LEDGER_MAX_WALLET_BALANCE_{code}"), "10000000.00");
            max_transaction_amount.insert(currency, tx_limit);
            max_wallet_balance.insert(currency, balance_limit);
        }

        Limits {
            max_transaction_amount,
            max_wallet_balance,
        }
    }

    /// Generous limits for every currency, used by tests that exercise the
    /// engine without caring about limit enforcement itself.
    pub fn for_tests() -> Self {
        let mut max_transaction_amount = HashMap::new();
        let mut max_wallet_balance = HashMap::new();
        for currency in [Currency::Usd, Currency::Eur, Currency::Gbp] {
            max_transaction_amount.insert(currency, Money::parse("1000000.00").unwrap());
            max_wallet_balance.insert(currency, Money::parse("10000000.00").unwrap());
        }
        Limits {
            max_transaction_amount,
            max_wallet_balance,
        }
    }

    pub fn max_transaction_amount(&self, currency: Currency) -> Money {
        self.max_transaction_amount
            .get(&currency)
            .copied()
            .unwrap_or(Money::ZERO)
    }

    pub fn max_wallet_balance(&self, currency: Currency) -> Money {
        self.max_wallet_balance
            .get(&currency)
            .copied()
            .unwrap_or(Money::ZERO)
    }
}

/// Per-scope sliding-window rate limits, requests per minute.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub wallet_limit_per_minute: u32,
    pub user_limit_per_minute: u32,
    pub global_limit_per_minute: u32,
}

impl RateLimitConfig {
    fn from_env() -> Self {
        RateLimitConfig {
            wallet_limit_per_minute: env_u32("RATE_LIMIT_WALLET_PER_MINUTE", 60),
            user_limit_per_minute: env_u32("RATE_LIMIT_USER_PER_MINUTE", 300),
            global_limit_per_minute: env_u32("RATE_LIMIT_GLOBAL_PER_MINUTE", 10_000),
        }
    }
}

/// Outbox relay tuning.
#[derive(Debug, Clone, Copy)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    pub batch_size: u32,
}

impl OutboxConfig {
    fn from_env() -> Self {
        OutboxConfig {
            poll_interval: Duration::from_millis(env_u64("OUTBOX_POLL_INTERVAL_MS", 500)),
            batch_size: env_u32("OUTBOX_BATCH_SIZE", 100),
        }
    }
}

/// The assembled runtime configuration, loaded once at startup the way
/// `private_poker`'s `RateLimitConfig::login()` et al. read individual
/// environment variables with typed fallbacks.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub event_log_url: String,
    pub event_log_stream: String,
    pub limits: Limits,
    pub rate_limits: RateLimitConfig,
    pub outbox: OutboxConfig,
    /// Opaque to the core; trusted by the glue layer that verifies caller
    /// identity and forwards only the resulting user id.
    pub trust_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/wallet_ledger".to_string()),
            event_log_url: std::env::var("EVENT_LOG_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            event_log_stream: std::env::var("EVENT_LOG_STREAM")
                .unwrap_or_else(|_| "wallet-ledger-events".to_string()),
            limits: Limits::from_env(),
            rate_limits: RateLimitConfig::from_env(),
            outbox: OutboxConfig::from_env(),
            trust_key: std::env::var("LEDGER_TRUST_KEY").ok(),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_money(key: &str, default: &str) -> Money {
    std::env::var(key)
        .ok()
        .and_then(|v| Money::parse(&v).ok())
        .unwrap_or_else(|| Money::parse(default).expect("default money literal parses"))
}
