//! In-Memory Ledger Store
//!
//! Single-process backend for tests and local development. One mutex guards
//! accounts and records together, so every method is one atomic unit. It gives
//! no cross-process guarantees; deployments use [`super::postgres::PgLedgerStore`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::error::LedgerError;
use super::state::TransactionStatus;
use super::store::{BalanceEffect, LedgerStore, Settlement, StatusUpdate, Transition};
use super::types::{AccountId, Transaction, TransactionDraft, TransactionId};
use crate::money::Amount;

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, Amount>,
    transactions: HashMap<TransactionId, Transaction>,
    by_key: HashMap<String, TransactionId>,
}

impl Inner {
    fn balance(&self, account: AccountId) -> Result<Amount, LedgerError> {
        self.accounts
            .get(&account)
            .copied()
            .ok_or(LedgerError::AccountNotFound(account))
    }

    /// Compute the post-effect balance without writing it
    fn preview(&self, effect: BalanceEffect) -> Result<Option<(AccountId, Amount)>, LedgerError> {
        match effect {
            BalanceEffect::None => Ok(None),
            BalanceEffect::Debit { account, amount } => {
                let available = self.balance(account)?;
                let next = available
                    .checked_sub(amount)
                    .ok_or(LedgerError::InsufficientFunds {
                        available,
                        requested: amount,
                    })?;
                Ok(Some((account, next)))
            }
            BalanceEffect::Credit { account, amount } => {
                let next = self
                    .balance(account)?
                    .checked_add(amount)
                    .filter(|b| *b <= Amount::MAX_STORABLE)
                    .ok_or(LedgerError::Overflow)?;
                Ok(Some((account, next)))
            }
        }
    }

    fn insert(&mut self, tx: Transaction) -> Result<(), LedgerError> {
        if self.by_key.contains_key(&tx.idempotency_key) {
            return Err(LedgerError::DuplicateOperation(tx.idempotency_key));
        }
        self.by_key.insert(tx.idempotency_key.clone(), tx.id);
        self.transactions.insert(tx.id, tx);
        Ok(())
    }
}

fn apply_update(tx: &mut Transaction, update: StatusUpdate) {
    if update.external_reference.is_some() {
        tx.external_reference = update.external_reference;
    }
    if update.error.is_some() {
        tx.error = update.error;
    }
    if let Some(metadata) = update.metadata {
        tx.metadata = metadata;
    }
    if update.balance_after.is_some() {
        tx.balance_after = update.balance_after;
    }
    tx.updated_at = chrono::Utc::now().timestamp_millis();
}

/// Mutex-backed ledger store
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, LedgerError> {
        self.inner
            .lock()
            .map_err(|_| LedgerError::Database("memory store lock poisoned".into()))
    }

    /// All records owned by an account, oldest first
    pub fn transactions_for(&self, account: AccountId) -> Result<Vec<Transaction>, LedgerError> {
        let inner = self.lock()?;
        let mut records: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|t| t.account_id == account)
            .cloned()
            .collect();
        records.sort_by_key(|t| t.id);
        Ok(records)
    }

    pub fn transaction_count(&self) -> Result<usize, LedgerError> {
        Ok(self.lock()?.transactions.len())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open_account(&self, account: AccountId, opening: Amount) -> Result<(), LedgerError> {
        if opening > Amount::MAX_STORABLE {
            return Err(LedgerError::Overflow);
        }
        self.lock()?.accounts.entry(account).or_insert(opening);
        Ok(())
    }

    async fn get_balance(&self, account: AccountId) -> Result<Amount, LedgerError> {
        self.lock()?.balance(account)
    }

    async fn debit(&self, account: AccountId, amount: Amount) -> Result<Amount, LedgerError> {
        let mut inner = self.lock()?;
        let (_, next) = inner
            .preview(BalanceEffect::Debit { account, amount })?
            .ok_or(LedgerError::AccountNotFound(account))?;
        inner.accounts.insert(account, next);
        Ok(next)
    }

    async fn credit(&self, account: AccountId, amount: Amount) -> Result<Amount, LedgerError> {
        let mut inner = self.lock()?;
        let (_, next) = inner
            .preview(BalanceEffect::Credit { account, amount })?
            .ok_or(LedgerError::AccountNotFound(account))?;
        inner.accounts.insert(account, next);
        Ok(next)
    }

    async fn create_transaction(
        &self,
        draft: TransactionDraft,
    ) -> Result<Transaction, LedgerError> {
        let tx = draft.into_transaction()?;
        let mut inner = self.lock()?;
        inner.balance(tx.account_id)?;
        inner.insert(tx.clone())?;
        Ok(tx)
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        self.lock()?
            .transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::TransactionNotFound(id.to_string()))
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transaction>, LedgerError> {
        let inner = self.lock()?;
        Ok(inner
            .by_key
            .get(key)
            .and_then(|id| inner.transactions.get(id))
            .cloned())
    }

    async fn update_transaction_status(
        &self,
        id: TransactionId,
        from: &[TransactionStatus],
        to: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<Transition, LedgerError> {
        self.settle(Settlement::new(id, from, to).with_update(update))
            .await
    }

    async fn annotate(
        &self,
        id: TransactionId,
        update: StatusUpdate,
    ) -> Result<bool, LedgerError> {
        let mut inner = self.lock()?;
        let tx = inner
            .transactions
            .get_mut(&id)
            .ok_or_else(|| LedgerError::TransactionNotFound(id.to_string()))?;
        if tx.status.is_terminal() {
            return Ok(false);
        }
        apply_update(tx, update);
        Ok(true)
    }

    async fn settle(&self, settlement: Settlement) -> Result<Transition, LedgerError> {
        settlement.validate()?;
        let mut inner = self.lock()?;

        let current = inner
            .transactions
            .get(&settlement.transaction_id)
            .map(|t| (t.status, t.account_id))
            .ok_or_else(|| LedgerError::TransactionNotFound(settlement.transaction_id.to_string()))?;
        let (status, owner) = current;
        if !settlement.from.contains(&status) {
            return Ok(Transition::Skipped { current: status });
        }

        // Validate everything before the first write
        let effect = inner.preview(settlement.effect)?;
        let companion = match settlement.companion {
            Some(draft) => {
                let mut record = draft.into_transaction()?;
                if inner.by_key.contains_key(&record.idempotency_key) {
                    return Err(LedgerError::DuplicateOperation(record.idempotency_key));
                }
                record.status = TransactionStatus::Success;
                record.balance_after = effect
                    .filter(|(account, _)| *account == record.account_id)
                    .map(|(_, balance)| balance);
                Some(record)
            }
            None => None,
        };

        if let Some((account, balance)) = effect {
            inner.accounts.insert(account, balance);
        }
        if let Some(record) = companion.clone() {
            inner.insert(record)?;
        }

        let mut update = settlement.update;
        if let Some((account, balance)) = effect
            && account == owner
        {
            update.balance_after = Some(balance);
        }
        if let Some(tx) = inner.transactions.get_mut(&settlement.transaction_id) {
            tx.status = settlement.to;
            apply_update(tx, update);
        }

        Ok(Transition::Applied {
            balance: effect.map(|(_, balance)| balance),
            companion,
        })
    }

    async fn increment_retry(&self, id: TransactionId) -> Result<(), LedgerError> {
        let mut inner = self.lock()?;
        let tx = inner
            .transactions
            .get_mut(&id)
            .ok_or_else(|| LedgerError::TransactionNotFound(id.to_string()))?;
        tx.retry_count += 1;
        tx.updated_at = chrono::Utc::now().timestamp_millis();
        Ok(())
    }

    async fn find_stale(
        &self,
        statuses: &[TransactionStatus],
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let cutoff = chrono::Utc::now().timestamp_millis() - older_than.as_millis() as i64;
        let inner = self.lock()?;
        let mut stale: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|t| statuses.contains(&t.status) && t.updated_at <= cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|t| t.updated_at);
        stale.truncate(limit);
        Ok(stale)
    }
}
