//! Compensation (refund) handling
//!
//! Reverses the balance effect of a debit-class transaction whose external
//! leg is confirmed failed. The refund credit, the `Refund` companion record
//! and the original's move to `FAILED_REFUNDED` are one settlement unit guarded
//! by a status CAS, so a transaction is refunded at most once no matter how
//! many times compensation runs.
//!
//! If the refund itself cannot be applied the original is parked in
//! `REFUND_PENDING` and an operator alert is raised. It is never reported as
//! a plain failure in that case.

use std::sync::Arc;
use tracing::{error, info, warn};

use super::alert::{Alert, AlertKind, AlertSink};
use super::error::LedgerError;
use super::mutator::BalanceMutator;
use super::state::TransactionStatus;
use super::store::{BalanceEffect, LedgerStore, Settlement, StatusUpdate, Transition};
use super::types::{
    REFUND_KEY_PREFIX, Transaction, TransactionDraft, TransactionId, TransactionKind,
};
use crate::money::Amount;

/// Statuses from which a refund may be applied
pub const COMPENSABLE: [TransactionStatus; 2] =
    [TransactionStatus::Processing, TransactionStatus::RefundPending];

/// Idempotency key of the refund record for `original`
pub fn refund_key(original: TransactionId) -> String {
    format!("{}{}", REFUND_KEY_PREFIX, original)
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompensationOutcome {
    /// Refund applied; original is now `FAILED_REFUNDED`
    Refunded {
        balance: Option<Amount>,
        refund: Option<Transaction>,
    },
    /// Original was not in a compensable status; nothing written
    AlreadySettled(TransactionStatus),
    /// Refund could not be applied; original parked in `REFUND_PENDING`
    RefundFailed(LedgerError),
}

#[derive(Clone)]
pub struct CompensationHandler {
    store: Arc<dyn LedgerStore>,
    mutator: BalanceMutator,
    alerts: Arc<dyn AlertSink>,
}

impl CompensationHandler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        mutator: BalanceMutator,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            store,
            mutator,
            alerts,
        }
    }

    /// Refund `original.total_deduction` to its owner
    ///
    /// `reason` is the annotation explaining why the original failed.
    pub async fn compensate(
        &self,
        original: &Transaction,
        reason: &str,
    ) -> Result<CompensationOutcome, LedgerError> {
        if !original.kind.is_debit_class() {
            return Err(LedgerError::Validation(format!(
                "{} transactions have no debit to refund",
                original.kind
            )));
        }

        let mut refund = TransactionDraft::new(
            original.account_id,
            TransactionKind::Refund,
            original.total_deduction,
            refund_key(original.id),
        )
        .with_related(original.id)
        .with_metadata(serde_json::json!({ "reason": reason }));
        if let Some(counterparty) = original.counterparty_account_id {
            refund = refund.with_counterparty(counterparty);
        }

        let settlement = Settlement::new(
            original.id,
            &COMPENSABLE,
            TransactionStatus::FailedRefunded,
        )
        .with_effect(BalanceEffect::Credit {
            account: original.account_id,
            amount: original.total_deduction,
        })
        .with_update(StatusUpdate::error(reason))
        .with_companion(refund);

        match self.mutator.apply(settlement).await {
            Ok(Transition::Applied { balance, companion }) => {
                info!(
                    transaction_id = %original.id,
                    account_id = %original.account_id,
                    amount = %original.total_deduction,
                    "Refund applied"
                );
                Ok(CompensationOutcome::Refunded {
                    balance,
                    refund: companion,
                })
            }
            Ok(Transition::Skipped { current }) => {
                info!(
                    transaction_id = %original.id,
                    status = %current,
                    "Compensation skipped, already settled"
                );
                Ok(CompensationOutcome::AlreadySettled(current))
            }
            Err(e) => {
                self.park(original, reason, &e).await;
                Ok(CompensationOutcome::RefundFailed(e))
            }
        }
    }

    /// Mark the original `REFUND_PENDING` and raise an alert
    async fn park(&self, original: &Transaction, reason: &str, cause: &LedgerError) {
        let annotation =
            LedgerError::CompensationFailure(format!("{}; refund error: {}", reason, cause))
                .annotation();
        error!(
            transaction_id = %original.id,
            account_id = %original.account_id,
            amount = %original.total_deduction,
            error = %cause,
            "Refund failed"
        );

        let marked = self
            .store
            .update_transaction_status(
                original.id,
                &[TransactionStatus::Processing],
                TransactionStatus::RefundPending,
                StatusUpdate::error(annotation.clone()),
            )
            .await;
        match marked {
            Ok(Transition::Applied { .. }) => {}
            Ok(Transition::Skipped { .. }) => {
                // Already REFUND_PENDING from an earlier attempt
                if let Err(e) = self
                    .store
                    .annotate(original.id, StatusUpdate::error(annotation))
                    .await
                {
                    warn!(transaction_id = %original.id, error = %e, "Failed to annotate refund failure");
                }
            }
            Err(e) => {
                error!(
                    transaction_id = %original.id,
                    error = %e,
                    "Failed to mark transaction refund_pending"
                );
            }
        }

        self.alerts
            .raise(Alert::new(
                AlertKind::CompensationFailed,
                original.id,
                original.account_id,
                format!(
                    "refund of {} failed: {}",
                    original.total_deduction, cause
                ),
            ))
            .await;
    }
}
