//! Ledger Store
//!
//! System of record for balances and transaction records. Every write is
//! single-unit and strongly consistent; balance changes are guarded updates
//! enforced by the store itself, never read-compute-write in the caller.

use async_trait::async_trait;
use std::time::Duration;

use super::error::LedgerError;
use super::state::TransactionStatus;
use super::types::{AccountId, Transaction, TransactionDraft, TransactionId};
use crate::money::Amount;

/// Guarded balance change applied inside a [`Settlement`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    None,
    /// Fails with `InsufficientFunds` if `balance < amount`
    Debit { account: AccountId, amount: Amount },
    Credit { account: AccountId, amount: Amount },
}

impl BalanceEffect {
    pub fn account(&self) -> Option<AccountId> {
        match self {
            BalanceEffect::None => None,
            BalanceEffect::Debit { account, .. } | BalanceEffect::Credit { account, .. } => {
                Some(*account)
            }
        }
    }
}

/// Optional field updates written together with a status change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub external_reference: Option<String>,
    pub error: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub balance_after: Option<Amount>,
}

impl StatusUpdate {
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_external_reference(mut self, reference: Option<String>) -> Self {
        self.external_reference = reference;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One atomic unit: status CAS → balance effect → companion record → fields
#[derive(Debug, Clone)]
pub struct Settlement {
    pub transaction_id: TransactionId,
    /// Status must currently be one of these for the unit to apply
    pub from: Vec<TransactionStatus>,
    pub to: TransactionStatus,
    pub effect: BalanceEffect,
    pub update: StatusUpdate,
    /// Record inserted in the same unit (e.g. a refund), created as SUCCESS
    /// with `balance_after` set from the effect
    pub companion: Option<TransactionDraft>,
}

impl Settlement {
    pub fn new(
        transaction_id: TransactionId,
        from: &[TransactionStatus],
        to: TransactionStatus,
    ) -> Self {
        Self {
            transaction_id,
            from: from.to_vec(),
            to,
            effect: BalanceEffect::None,
            update: StatusUpdate::default(),
            companion: None,
        }
    }

    pub fn with_effect(mut self, effect: BalanceEffect) -> Self {
        self.effect = effect;
        self
    }

    pub fn with_update(mut self, update: StatusUpdate) -> Self {
        self.update = update;
        self
    }

    pub fn with_companion(mut self, companion: TransactionDraft) -> Self {
        self.companion = Some(companion);
        self
    }

    /// Reject transitions the state machine does not allow
    pub fn validate(&self) -> Result<(), LedgerError> {
        check_transitions(&self.from, self.to)
    }
}

/// Result of a CAS-guarded write
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Unit applied; `balance` is the post-effect balance when an effect ran
    Applied {
        balance: Option<Amount>,
        companion: Option<Transaction>,
    },
    /// Status did not match `from`; nothing was written
    Skipped { current: TransactionStatus },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Every `from → to` pair must be a legal forward transition
pub fn check_transitions(
    from: &[TransactionStatus],
    to: TransactionStatus,
) -> Result<(), LedgerError> {
    match from.iter().find(|f| !f.can_transition_to(to)) {
        Some(bad) => Err(LedgerError::InvalidStateTransition { from: *bad, to }),
        None if from.is_empty() => Err(LedgerError::Validation(
            "status transition needs at least one source status".into(),
        )),
        None => Ok(()),
    }
}

/// Ledger store contract
///
/// Implementations must make each method atomic with respect to concurrent
/// callers, including callers in other processes sharing the same backend.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open an account with an initial balance; opening an existing account is a no-op
    async fn open_account(&self, account: AccountId, opening: Amount) -> Result<(), LedgerError>;

    async fn get_balance(&self, account: AccountId) -> Result<Amount, LedgerError>;

    /// Guarded decrement: `balance -= amount` only if `balance >= amount`
    async fn debit(&self, account: AccountId, amount: Amount) -> Result<Amount, LedgerError>;

    /// Increment; fails only if the account does not exist
    async fn credit(&self, account: AccountId, amount: Amount) -> Result<Amount, LedgerError>;

    /// Insert a PENDING record
    ///
    /// Fails with `DuplicateOperation` when the idempotency key already exists.
    async fn create_transaction(&self, draft: TransactionDraft)
    -> Result<Transaction, LedgerError>;

    async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError>;

    async fn find_by_idempotency_key(&self, key: &str)
    -> Result<Option<Transaction>, LedgerError>;

    /// CAS status change with field updates, no balance effect
    async fn update_transaction_status(
        &self,
        id: TransactionId,
        from: &[TransactionStatus],
        to: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<Transition, LedgerError>;

    /// Annotate a non-terminal record without changing its status
    async fn annotate(&self, id: TransactionId, update: StatusUpdate)
    -> Result<bool, LedgerError>;

    /// Atomic settlement unit, see [`Settlement`]
    async fn settle(&self, settlement: Settlement) -> Result<Transition, LedgerError>;

    async fn increment_retry(&self, id: TransactionId) -> Result<(), LedgerError>;

    /// Records in `statuses` not updated for at least `older_than`, oldest first
    async fn find_stale(
        &self,
        statuses: &[TransactionStatus],
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError>;
}


#[cfg(test)]
pub use mock::FaultyStore;
