//! Wallet Ledger - balance mutation engine for a consumer wallet
//!
//! Moves money between user balances and an external settlement provider
//! without losing or duplicating funds under retries, partial failures and
//! concurrent requests.
//!
//! # Modules
//!
//! - [`money`] - Minor-unit amounts, parsing and formatting
//! - [`ledger`] - Store, mutator, idempotency, lifecycle controller,
//!   compensation and reconciliation
//! - [`cache`] - TTL balance cache with invalidation hooks
//! - [`db`] - PostgreSQL pool and schema bootstrap
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod cache;
pub mod config;
pub mod db;
pub mod ledger;
pub mod logging;
pub mod money;

// Convenient re-exports at crate root
pub use cache::BalanceCache;
pub use config::AppConfig;
pub use ledger::{
    AccountId, CreditRequest, DebitRequest, GatewayOutcome, LedgerError, LedgerStore,
    P2pRequest, TransactionController, TransactionId, TransactionKind, TransactionResult,
    TransactionStatus,
};
pub use money::{Amount, MoneyError};
