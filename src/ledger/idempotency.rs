//! Idempotency Guard
//!
//! Resolves a caller-chosen key to either "fresh" (caller may execute) or the
//! transaction already recorded for it. The store's unique constraint on
//! `idempotency_key` is the real arbiter: when two requests race past
//! [`IdempotencyGuard::reserve`], the loser's insert fails with
//! `DuplicateOperation` and [`IdempotencyGuard::record`] hands back the
//! winner's record.

use std::sync::Arc;
use tracing::debug;

use super::error::LedgerError;
use super::store::LedgerStore;
use super::types::{Transaction, TransactionDraft, validate_idempotency_key};

/// Result of reserving an idempotency key
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// No record yet; execution may proceed
    Fresh,
    /// Already processed (or in flight); return this outcome verbatim
    Existing(Transaction),
}

/// Result of recording a draft under its key
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    /// New PENDING record owned by this caller
    Created(Transaction),
    /// Another request won the race for the key
    Existing(Transaction),
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn LedgerStore>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Check the key before any side effect
    pub async fn reserve(&self, key: &str) -> Result<Reservation, LedgerError> {
        validate_idempotency_key(key)?;
        match self.store.find_by_idempotency_key(key).await? {
            Some(existing) => {
                debug!(
                    key = %key,
                    transaction_id = %existing.id,
                    status = %existing.status,
                    "Idempotency hit"
                );
                Ok(Reservation::Existing(existing))
            }
            None => Ok(Reservation::Fresh),
        }
    }

    /// Insert the PENDING record, resolving a lost race to the winner's record
    pub async fn record(&self, draft: TransactionDraft) -> Result<Recorded, LedgerError> {
        let key = draft.idempotency_key.clone();
        match self.store.create_transaction(draft).await {
            Ok(tx) => Ok(Recorded::Created(tx)),
            Err(LedgerError::DuplicateOperation(_)) => {
                let existing = self
                    .store
                    .find_by_idempotency_key(&key)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::StorageConflict(format!(
                            "key {} reported duplicate but no record found",
                            key
                        ))
                    })?;
                debug!(key = %key, transaction_id = %existing.id, "Lost idempotency race");
                Ok(Recorded::Existing(existing))
            }
            Err(e) => Err(e),
        }
    }
}
