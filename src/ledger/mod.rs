//! Ledger
//!
//! Wallet balances and the transaction records that move them.
//!
//! # Architecture
//!
//! ```text
//! request ──▶ IdempotencyGuard ──▶ TransactionController ──▶ SettlementGateway
//!                                     │         │
//!                                     ▼         ▼
//!                              BalanceMutator  CompensationHandler
//!                                     │         │
//!                                     └──▶ LedgerStore ◀── ReconciliationWorker
//! ```
//!
//! # Safety Invariants
//!
//! - Balances never go negative: debits are guarded updates in the store.
//! - One idempotency key, one transaction record, one result.
//! - A balance effect and its status transition are one atomic unit, so money
//!   moves at most once per record even across processes.
//! - Ambiguous gateway outcomes are never compensated automatically.

pub mod alert;
pub mod compensation;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod http_gateway;
pub mod idempotency;
pub mod memory;
pub mod mutator;
pub mod postgres;
pub mod state;
pub mod store;
pub mod types;
pub mod worker;

#[cfg(test)]
mod integration_tests;

pub use alert::{Alert, AlertKind, AlertSink, TracingAlertSink};
pub use compensation::{CompensationHandler, CompensationOutcome};
pub use controller::{ControllerConfig, TransactionController};
pub use error::LedgerError;
pub use gateway::{GatewayOutcome, GatewayReceipt, SettlementGateway, TransferInstruction};
pub use http_gateway::HttpSettlementGateway;
pub use idempotency::{IdempotencyGuard, Reservation};
pub use memory::MemoryLedgerStore;
pub use mutator::BalanceMutator;
pub use postgres::PgLedgerStore;
pub use state::TransactionStatus;
pub use store::{BalanceEffect, LedgerStore, Settlement, StatusUpdate, Transition};
pub use types::{
    AccountId, CreditRequest, DebitRequest, GatewayParams, P2pRequest, Transaction,
    TransactionDraft, TransactionId, TransactionKind, TransactionResult,
};
pub use worker::{ReconciliationWorker, WorkerConfig};
