//! Balance Mutator
//!
//! The only path through which balances change. Both primitives delegate the
//! check-and-apply to the store as one guarded update, so two concurrent debits
//! on the same account cannot both pass the funds check. No transaction record
//! is written here; callers own record keeping.

use std::sync::Arc;
use tracing::{debug, info};

use super::error::LedgerError;
use super::store::{LedgerStore, Settlement, Transition};
use super::types::AccountId;
use crate::cache::BalanceCache;
use crate::money::Amount;

#[derive(Clone)]
pub struct BalanceMutator {
    store: Arc<dyn LedgerStore>,
    cache: Arc<BalanceCache>,
}

impl BalanceMutator {
    pub fn new(store: Arc<dyn LedgerStore>, cache: Arc<BalanceCache>) -> Self {
        Self { store, cache }
    }

    /// Guarded decrement, fails with `InsufficientFunds` when `balance < amount`
    pub async fn debit(&self, account: AccountId, amount: Amount) -> Result<Amount, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        let balance = self.store.debit(account, amount).await?;
        self.cache.invalidate(account);
        debug!(account_id = %account, amount = %amount, balance = %balance, "Debit applied");
        Ok(balance)
    }

    /// Increment; an existing account can always receive funds
    pub async fn credit(&self, account: AccountId, amount: Amount) -> Result<Amount, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        let balance = self.store.credit(account, amount).await?;
        self.cache.invalidate(account);
        debug!(account_id = %account, amount = %amount, balance = %balance, "Credit applied");
        Ok(balance)
    }

    /// Apply a balance effect together with a record status transition
    ///
    /// The effect runs only if the CAS matches, so a retried step can never
    /// move money twice for the same record.
    pub async fn apply(&self, settlement: Settlement) -> Result<Transition, LedgerError> {
        let account = settlement.effect.account();
        let transaction_id = settlement.transaction_id;
        let target = settlement.to;

        let transition = match self.store.settle(settlement).await {
            Ok(transition) => transition,
            Err(e) => {
                // The write may still have committed
                if let Some(account) = account {
                    self.cache.invalidate(account);
                }
                return Err(e);
            }
        };

        if let (Some(account), Transition::Applied { balance, .. }) = (account, &transition) {
            self.cache.invalidate(account);
            info!(
                transaction_id = %transaction_id,
                account_id = %account,
                status = %target,
                balance = ?balance.map(|b| b.to_string()),
                "Balance settlement applied"
            );
        }
        Ok(transition)
    }

    /// Balance read through the TTL cache
    pub async fn balance(&self, account: AccountId) -> Result<Amount, LedgerError> {
        if let Some(cached) = self.cache.get(account) {
            return Ok(cached);
        }
        let balance = self.store.get_balance(account).await?;
        self.cache.put(account, balance);
        Ok(balance)
    }
}
