//! Transaction Lifecycle Controller
//!
//! Drives one money-movement operation through the state machine:
//!
//! ```text
//! pending --(debit applied)--> processing --(gateway success)--> success
//!                                         \--(gateway failure)--> compensate --> failed_refunded
//!                                         \--(ambiguous)--> processing (awaits reconciliation)
//! pending --(insufficient funds)--> failed (no side effects)
//! ```
//!
//! Debit-class operations apply the local debit before calling the gateway.
//! Credit-class operations verify with the gateway first and credit only on
//! confirmed success. Every path returns with the record either terminal or
//! reconcilable; the returned [`TransactionResult`] is always read back from
//! the persisted record, so replays of the same key are identical.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::alert::{Alert, AlertKind, AlertSink};
use super::compensation::{CompensationHandler, CompensationOutcome};
use super::error::LedgerError;
use super::gateway::{GatewayOutcome, SettlementGateway, TransferInstruction, with_timeout};
use super::idempotency::{IdempotencyGuard, Recorded, Reservation};
use super::mutator::BalanceMutator;
use super::state::TransactionStatus;
use super::store::{BalanceEffect, LedgerStore, Settlement, StatusUpdate, Transition};
use super::types::{
    AccountId, CreditRequest, DebitRequest, P2pRequest, Transaction, TransactionDraft,
    RECEIVER_KEY_SUFFIX, TransactionId, TransactionKind, TransactionResult, validate_client_key,
    validate_idempotency_key,
};
use crate::cache::BalanceCache;
use crate::money::Amount;

/// Reason recorded when reconciliation retries a parked refund
const REFUND_RETRY_REASON: &str = "COMPENSATION_RETRY: refund re-attempted by reconciliation";

/// Idempotency key of the receiver leg of a P2P transfer
pub fn receiver_key(sender_key: &str) -> String {
    format!("{}{}", sender_key, RECEIVER_KEY_SUFFIX)
}

/// Whether `leg` is the receiver record written for `sender_tx`
fn is_receiver_leg(leg: &Transaction, sender_tx: &Transaction, receiver: AccountId) -> bool {
    leg.kind == TransactionKind::P2pReceived
        && leg.account_id == receiver
        && leg.amount == sender_tx.amount
        && leg.related_transaction_id == Some(sender_tx.id)
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Upper bound on every gateway call
    pub gateway_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(30),
        }
    }
}

pub struct TransactionController {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn SettlementGateway>,
    alerts: Arc<dyn AlertSink>,
    mutator: BalanceMutator,
    guard: IdempotencyGuard,
    compensation: CompensationHandler,
    config: ControllerConfig,
}

impl TransactionController {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn SettlementGateway>,
        alerts: Arc<dyn AlertSink>,
        cache: Arc<BalanceCache>,
        config: ControllerConfig,
    ) -> Self {
        let mutator = BalanceMutator::new(store.clone(), cache);
        let guard = IdempotencyGuard::new(store.clone());
        let compensation = CompensationHandler::new(store.clone(), mutator.clone(), alerts.clone());
        Self {
            store,
            gateway,
            alerts,
            mutator,
            guard,
            compensation,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Current balance (served from the TTL cache when fresh)
    pub async fn balance(&self, account: AccountId) -> Result<Amount, LedgerError> {
        self.mutator.balance(account).await
    }

    pub async fn transaction(&self, id: TransactionId) -> Result<Transaction, LedgerError> {
        self.store.get_transaction(id).await
    }

    // ========================================================================
    // Debit-class
    // ========================================================================

    /// Withdrawal, bill purchase or fee: debit locally, then settle externally
    pub async fn request_debit(&self, req: DebitRequest) -> Result<TransactionResult, LedgerError> {
        if !req.kind.is_debit_class() || req.kind == TransactionKind::P2pTransfer {
            return Err(LedgerError::Validation(format!(
                "{} is not a gateway debit",
                req.kind
            )));
        }
        if req.gateway.destination.trim().is_empty() {
            return Err(LedgerError::Validation("gateway destination is empty".into()));
        }
        let draft = TransactionDraft::new(req.account_id, req.kind, req.amount, &req.idempotency_key)
            .with_fee(req.fee);
        draft.validate()?;

        let tx = match self.begin(draft).await? {
            Ok(tx) => tx,
            Err(result) => return Ok(result),
        };
        info!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            kind = %tx.kind,
            amount = %tx.amount,
            fee = %tx.fee,
            "Debit requested"
        );

        let tx = match self.apply_debit(tx).await? {
            Ok(tx) => tx,
            Err(result) => return Ok(result),
        };

        let instruction = TransferInstruction {
            amount: tx.amount,
            destination: req.gateway.destination,
            reference: tx.id.to_string(),
            kind: tx.kind,
            narration: req.gateway.narration,
        };
        let outcome = with_timeout(
            self.config.gateway_timeout,
            self.gateway.initiate_transfer(&instruction),
        )
        .await;

        let settled = self.settle_debit(&tx, outcome).await?;
        Ok(TransactionResult::from(&settled))
    }

    /// Pending → processing with the guarded debit in the same unit
    ///
    /// `Ok(Err(result))` means the operation ended here (rejected or taken
    /// over by a concurrent caller).
    async fn apply_debit(
        &self,
        tx: Transaction,
    ) -> Result<Result<Transaction, TransactionResult>, LedgerError> {
        let settlement = Settlement::new(tx.id, &[TransactionStatus::Pending], TransactionStatus::Processing)
            .with_effect(BalanceEffect::Debit {
                account: tx.account_id,
                amount: tx.total_deduction,
            });

        match self.mutator.apply(settlement).await {
            Ok(Transition::Applied { .. }) => Ok(Ok(self.store.get_transaction(tx.id).await?)),
            Ok(Transition::Skipped { current }) => {
                warn!(transaction_id = %tx.id, status = %current, "Debit step lost CAS race");
                Ok(Err(self.result(tx.id).await?))
            }
            Err(e @ LedgerError::InsufficientFunds { .. }) => {
                info!(
                    transaction_id = %tx.id,
                    account_id = %tx.account_id,
                    error = %e,
                    "Debit rejected"
                );
                self.store
                    .update_transaction_status(
                        tx.id,
                        &[TransactionStatus::Pending],
                        TransactionStatus::Failed,
                        StatusUpdate::error(e.annotation()),
                    )
                    .await?;
                Ok(Err(self.result(tx.id).await?))
            }
            Err(e) => {
                self.reject(tx.id, &e).await;
                Err(e)
            }
        }
    }

    /// Feed a gateway outcome into a PROCESSING debit-class record
    async fn settle_debit(
        &self,
        tx: &Transaction,
        outcome: GatewayOutcome,
    ) -> Result<Transaction, LedgerError> {
        match outcome {
            GatewayOutcome::Success(receipt) => {
                let update = StatusUpdate::default()
                    .with_external_reference(receipt.reference)
                    .with_metadata(receipt.payload);
                let transition = self
                    .store
                    .update_transaction_status(
                        tx.id,
                        &[TransactionStatus::Processing],
                        TransactionStatus::Success,
                        update,
                    )
                    .await?;
                match transition {
                    Transition::Applied { .. } => info!(
                        transaction_id = %tx.id,
                        account_id = %tx.account_id,
                        amount = %tx.amount,
                        "Debit settled"
                    ),
                    Transition::Skipped { current } => warn!(
                        transaction_id = %tx.id,
                        status = %current,
                        "Gateway success arrived after record left processing"
                    ),
                }
            }
            GatewayOutcome::Failed(reason) => {
                warn!(transaction_id = %tx.id, reason = %reason, "Gateway confirmed failure");
                let annotation = LedgerError::GatewayFailure(reason).annotation();
                self.compensation.compensate(tx, &annotation).await?;
            }
            GatewayOutcome::Ambiguous(reason) => {
                self.mark_ambiguous(tx, reason).await?;
            }
        }
        self.store.get_transaction(tx.id).await
    }

    // ========================================================================
    // Credit-class
    // ========================================================================

    /// Wallet funding: verify the payment, then credit exactly once
    pub async fn request_credit(
        &self,
        req: CreditRequest,
    ) -> Result<TransactionResult, LedgerError> {
        let draft = TransactionDraft::new(
            req.account_id,
            TransactionKind::Credit,
            req.amount,
            &req.payment_reference,
        )
        .with_external_reference(&req.payment_reference);
        draft.validate()?;

        let tx = match self.begin(draft).await? {
            Ok(tx) => tx,
            Err(result) => return Ok(result),
        };
        info!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            amount = %tx.amount,
            "Credit requested"
        );

        let transition = self
            .store
            .update_transaction_status(
                tx.id,
                &[TransactionStatus::Pending],
                TransactionStatus::Processing,
                StatusUpdate::default(),
            )
            .await?;
        if let Transition::Skipped { current } = transition {
            warn!(transaction_id = %tx.id, status = %current, "Credit step lost CAS race");
            return self.result(tx.id).await;
        }

        let settled = self.verify_and_credit(&tx).await?;
        Ok(TransactionResult::from(&settled))
    }

    async fn verify_and_credit(&self, tx: &Transaction) -> Result<Transaction, LedgerError> {
        let reference = tx
            .external_reference
            .clone()
            .unwrap_or_else(|| tx.idempotency_key.clone());
        let outcome = with_timeout(
            self.config.gateway_timeout,
            self.gateway.verify_payment(&reference),
        )
        .await;
        self.settle_credit(tx, outcome).await
    }

    /// Feed a verification outcome into a PROCESSING credit record
    async fn settle_credit(
        &self,
        tx: &Transaction,
        outcome: GatewayOutcome,
    ) -> Result<Transaction, LedgerError> {
        match outcome {
            GatewayOutcome::Success(receipt) if receipt.amount == Some(tx.amount) => {
                let settlement = Settlement::new(
                    tx.id,
                    &[TransactionStatus::Processing],
                    TransactionStatus::Success,
                )
                .with_effect(BalanceEffect::Credit {
                    account: tx.account_id,
                    amount: tx.amount,
                })
                .with_update(StatusUpdate::default().with_metadata(receipt.payload));

                match self.mutator.apply(settlement).await? {
                    Transition::Applied { balance, .. } => info!(
                        transaction_id = %tx.id,
                        account_id = %tx.account_id,
                        amount = %tx.amount,
                        balance = ?balance.map(|b| b.to_string()),
                        "Credit settled"
                    ),
                    Transition::Skipped { current } => debug!(
                        transaction_id = %tx.id,
                        status = %current,
                        "Credit already settled"
                    ),
                }
            }
            GatewayOutcome::Success(receipt) => {
                let detail = match receipt.amount {
                    Some(verified) => {
                        format!("verified amount {} does not match requested {}", verified, tx.amount)
                    }
                    None => "provider did not report a verified amount".to_string(),
                };
                if receipt.amount.is_some() {
                    self.alerts
                        .raise(Alert::new(
                            AlertKind::AmountMismatch,
                            tx.id,
                            tx.account_id,
                            detail.clone(),
                        ))
                        .await;
                }
                self.mark_ambiguous(tx, detail).await?;
            }
            GatewayOutcome::Failed(reason) => {
                let transition = self
                    .store
                    .update_transaction_status(
                        tx.id,
                        &[TransactionStatus::Processing],
                        TransactionStatus::Failed,
                        StatusUpdate::error(LedgerError::GatewayFailure(reason).annotation()),
                    )
                    .await?;
                if transition.is_applied() {
                    info!(transaction_id = %tx.id, "Payment not confirmed, credit failed");
                }
            }
            GatewayOutcome::Ambiguous(reason) => {
                self.mark_ambiguous(tx, reason).await?;
            }
        }
        self.store.get_transaction(tx.id).await
    }

    // ========================================================================
    // P2P
    // ========================================================================

    /// Wallet-to-wallet transfer: sender debit and receiver credit as two
    /// linked records, with the sender refunded if the credit leg fails
    pub async fn request_p2p(&self, req: P2pRequest) -> Result<TransactionResult, LedgerError> {
        if req.sender == req.receiver {
            return Err(LedgerError::SameAccount);
        }
        let draft = TransactionDraft::new(
            req.sender,
            TransactionKind::P2pTransfer,
            req.amount,
            &req.idempotency_key,
        )
        .with_counterparty(req.receiver);
        draft.validate()?;
        validate_idempotency_key(&receiver_key(&req.idempotency_key))?;

        let tx = match self.begin(draft).await? {
            Ok(tx) => tx,
            Err(result) => return Ok(result),
        };
        // Unknown receivers are rejected before any money moves
        if let Err(e) = self.store.get_balance(req.receiver).await {
            self.reject(tx.id, &e).await;
            return Err(e);
        }
        info!(
            transaction_id = %tx.id,
            sender = %req.sender,
            receiver = %req.receiver,
            amount = %tx.amount,
            "P2P transfer requested"
        );

        let tx = match self.apply_debit(tx).await? {
            Ok(tx) => tx,
            Err(result) => return Ok(result),
        };
        let settled = self.complete_p2p(&tx).await?;
        Ok(TransactionResult::from(&settled))
    }

    /// Credit the receiver leg of a PROCESSING sender record, then settle the
    /// sender as success or compensate it
    async fn complete_p2p(&self, sender_tx: &Transaction) -> Result<Transaction, LedgerError> {
        let receiver = sender_tx.counterparty_account_id.ok_or_else(|| {
            LedgerError::Validation(format!("P2P record {} has no receiver", sender_tx.id))
        })?;

        let credited = match self.receiver_leg(sender_tx, receiver).await {
            Ok(leg) => match leg.status {
                TransactionStatus::Success => Ok(leg),
                TransactionStatus::Pending => {
                    let credit = self.credit_receiver(&leg).await;
                    credit.map(|_| leg)
                }
                other => Err(LedgerError::StorageConflict(format!(
                    "receiver leg {} is {}",
                    leg.id, other
                ))),
            },
            Err(e) => Err(e),
        };

        let credited = match credited {
            Err(e) => match self.unwind_receiver_leg(sender_tx, receiver, &e).await? {
                Some(leg) => {
                    warn!(
                        transaction_id = %sender_tx.id,
                        receiver_transaction_id = %leg.id,
                        error = %e,
                        "Receiver credit reported an error but was committed"
                    );
                    Ok(leg)
                }
                None => Err(e),
            },
            ok => ok,
        };

        match credited {
            Ok(leg) => {
                let transition = self
                    .store
                    .update_transaction_status(
                        sender_tx.id,
                        &[TransactionStatus::Processing],
                        TransactionStatus::Success,
                        StatusUpdate::default(),
                    )
                    .await?;
                if transition.is_applied() {
                    info!(
                        transaction_id = %sender_tx.id,
                        receiver_transaction_id = %leg.id,
                        amount = %sender_tx.amount,
                        "P2P transfer settled"
                    );
                }
            }
            Err(e) => {
                error!(
                    transaction_id = %sender_tx.id,
                    receiver = %receiver,
                    error = %e,
                    "P2P receiver credit failed, refunding sender"
                );
                self.compensation.compensate(sender_tx, &e.annotation()).await?;
            }
        }
        self.store.get_transaction(sender_tx.id).await
    }

    /// Fetch or create the receiver's PENDING record
    async fn receiver_leg(
        &self,
        sender_tx: &Transaction,
        receiver: AccountId,
    ) -> Result<Transaction, LedgerError> {
        let draft = TransactionDraft::new(
            receiver,
            TransactionKind::P2pReceived,
            sender_tx.amount,
            receiver_key(&sender_tx.idempotency_key),
        )
        .with_counterparty(sender_tx.account_id)
        .with_related(sender_tx.id);
        match self.guard.record(draft).await? {
            Recorded::Created(leg) => Ok(leg),
            Recorded::Existing(leg) if is_receiver_leg(&leg, sender_tx, receiver) => Ok(leg),
            Recorded::Existing(other) => Err(LedgerError::DuplicateOperation(format!(
                "receiver key {} is held by transaction {}",
                other.idempotency_key, other.id
            ))),
        }
    }

    /// Close the receiver leg after a failed credit attempt
    ///
    /// Returns the leg when the credit was in fact committed, in which case
    /// the sender must not be refunded. `Ok(None)` means the receiver was
    /// not credited: the leg is now `failed`, or no leg of this transfer
    /// exists. Storage errors leave the sender in `processing`.
    async fn unwind_receiver_leg(
        &self,
        sender_tx: &Transaction,
        receiver: AccountId,
        cause: &LedgerError,
    ) -> Result<Option<Transaction>, LedgerError> {
        let key = receiver_key(&sender_tx.idempotency_key);
        let leg = match self.store.find_by_idempotency_key(&key).await? {
            Some(leg) if is_receiver_leg(&leg, sender_tx, receiver) => leg,
            _ => return Ok(None),
        };
        let transition = self
            .store
            .update_transaction_status(
                leg.id,
                &[TransactionStatus::Pending],
                TransactionStatus::Failed,
                StatusUpdate::error(cause.annotation()),
            )
            .await?;
        match transition {
            Transition::Applied { .. }
            | Transition::Skipped {
                current: TransactionStatus::Failed,
            } => Ok(None),
            Transition::Skipped {
                current: TransactionStatus::Success,
            } => Ok(Some(self.store.get_transaction(leg.id).await?)),
            Transition::Skipped { current } => Err(LedgerError::StorageConflict(format!(
                "receiver leg {} is {}",
                leg.id, current
            ))),
        }
    }

    async fn credit_receiver(&self, leg: &Transaction) -> Result<(), LedgerError> {
        let settlement = Settlement::new(leg.id, &[TransactionStatus::Pending], TransactionStatus::Success)
            .with_effect(BalanceEffect::Credit {
                account: leg.account_id,
                amount: leg.amount,
            });
        match self.mutator.apply(settlement).await? {
            Transition::Applied { .. } => Ok(()),
            Transition::Skipped {
                current: TransactionStatus::Success,
            } => Ok(()),
            Transition::Skipped { current } => Err(LedgerError::StorageConflict(format!(
                "receiver leg {} moved to {}",
                leg.id, current
            ))),
        }
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Webhook entry point: apply a definitive outcome to a PROCESSING record
    pub async fn apply_outcome(
        &self,
        id: TransactionId,
        outcome: GatewayOutcome,
    ) -> Result<TransactionResult, LedgerError> {
        let tx = self.store.get_transaction(id).await?;
        if tx.status != TransactionStatus::Processing {
            debug!(transaction_id = %id, status = %tx.status, "Outcome ignored, not processing");
            return Ok(TransactionResult::from(&tx));
        }
        let settled = match tx.kind {
            TransactionKind::Credit => self.settle_credit(&tx, outcome).await?,
            TransactionKind::P2pTransfer => {
                return Err(LedgerError::Validation(
                    "P2P transfers have no gateway leg".into(),
                ));
            }
            kind if kind.is_debit_class() => self.settle_debit(&tx, outcome).await?,
            kind => {
                return Err(LedgerError::Validation(format!(
                    "{} records take no gateway outcome",
                    kind
                )));
            }
        };
        Ok(TransactionResult::from(&settled))
    }

    /// Drive a non-terminal record towards a terminal state
    ///
    /// Queries the gateway for PROCESSING gateway operations, finishes or
    /// unwinds interrupted P2P transfers, retries parked refunds, and closes
    /// PENDING records that never reached their balance effect.
    pub async fn reconcile(&self, id: TransactionId) -> Result<TransactionResult, LedgerError> {
        let tx = self.store.get_transaction(id).await?;
        let settled = match (tx.status, tx.kind) {
            (status, _) if status.is_terminal() => tx,

            (TransactionStatus::RefundPending, _) => {
                match self.compensation.compensate(&tx, REFUND_RETRY_REASON).await? {
                    CompensationOutcome::Refunded { .. } => {
                        info!(transaction_id = %id, "Parked refund applied")
                    }
                    CompensationOutcome::AlreadySettled(status) => {
                        debug!(transaction_id = %id, status = %status, "Refund already settled")
                    }
                    CompensationOutcome::RefundFailed(e) => {
                        warn!(transaction_id = %id, error = %e, "Parked refund still failing")
                    }
                }
                self.store.get_transaction(id).await?
            }

            (TransactionStatus::Processing, TransactionKind::P2pTransfer) => {
                self.complete_p2p(&tx).await?
            }
            (TransactionStatus::Processing, TransactionKind::Credit) => {
                self.verify_and_credit(&tx).await?
            }
            (TransactionStatus::Processing, kind) if kind.is_debit_class() => {
                let outcome = with_timeout(
                    self.config.gateway_timeout,
                    self.gateway.query_transfer(&tx.id.to_string()),
                )
                .await;
                self.settle_debit(&tx, outcome).await?
            }

            (TransactionStatus::Pending, TransactionKind::Credit) => {
                self.store
                    .update_transaction_status(
                        id,
                        &[TransactionStatus::Pending],
                        TransactionStatus::Processing,
                        StatusUpdate::default(),
                    )
                    .await?;
                let tx = self.store.get_transaction(id).await?;
                if tx.status == TransactionStatus::Processing {
                    self.verify_and_credit(&tx).await?
                } else {
                    tx
                }
            }
            (TransactionStatus::Pending, TransactionKind::P2pReceived) => {
                // The sender record owns this leg; close it only once the sender is final
                let sender_final = match tx.related_transaction_id {
                    Some(sender) => self.store.get_transaction(sender).await?.status.is_terminal(),
                    None => true,
                };
                if sender_final {
                    self.close_pending(&tx).await?
                } else {
                    tx
                }
            }
            (TransactionStatus::Pending, _) => self.close_pending(&tx).await?,

            _ => tx,
        };
        Ok(TransactionResult::from(&settled))
    }

    /// PENDING → FAILED for a record whose balance effect never ran
    async fn close_pending(&self, tx: &Transaction) -> Result<Transaction, LedgerError> {
        let reason = LedgerError::StorageConflict(
            "operation interrupted before its balance effect".into(),
        );
        let transition = self
            .store
            .update_transaction_status(
                tx.id,
                &[TransactionStatus::Pending],
                TransactionStatus::Failed,
                StatusUpdate::error(reason.annotation()),
            )
            .await?;
        if transition.is_applied() {
            info!(transaction_id = %tx.id, kind = %tx.kind, "Abandoned pending record closed");
        }
        self.store.get_transaction(tx.id).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Resolve the idempotency key and insert the PENDING record
    ///
    /// `Ok(Err(result))` carries the prior outcome for a replayed key.
    async fn begin(
        &self,
        draft: TransactionDraft,
    ) -> Result<Result<Transaction, TransactionResult>, LedgerError> {
        validate_client_key(&draft.idempotency_key)?;
        if let Reservation::Existing(existing) = self.guard.reserve(&draft.idempotency_key).await? {
            return self.replay(&draft, existing).map(Err);
        }
        match self.guard.record(draft.clone()).await? {
            Recorded::Created(tx) => Ok(Ok(tx)),
            Recorded::Existing(existing) => self.replay(&draft, existing).map(Err),
        }
    }

    /// Prior outcome for a replayed key; reusing a key for a different
    /// operation is refused
    fn replay(
        &self,
        draft: &TransactionDraft,
        existing: Transaction,
    ) -> Result<TransactionResult, LedgerError> {
        if existing.account_id != draft.account_id
            || existing.kind != draft.kind
            || existing.amount != draft.amount
            || existing.fee != draft.fee
            || existing.counterparty_account_id != draft.counterparty_account_id
        {
            return Err(LedgerError::DuplicateOperation(format!(
                "idempotency key {} already used by transaction {}",
                draft.idempotency_key, existing.id
            )));
        }
        debug!(
            transaction_id = %existing.id,
            status = %existing.status,
            "Replayed request, returning recorded outcome"
        );
        Ok(TransactionResult::from(&existing))
    }

    /// Record an ambiguous outcome without changing status
    async fn mark_ambiguous(&self, tx: &Transaction, reason: String) -> Result<(), LedgerError> {
        warn!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            reason = %reason,
            "Ambiguous gateway outcome, left for reconciliation"
        );
        self.store
            .annotate(
                tx.id,
                StatusUpdate::error(LedgerError::GatewayAmbiguous(reason).annotation()),
            )
            .await?;
        Ok(())
    }

    /// Best-effort PENDING → FAILED after an error with no side effects
    async fn reject(&self, id: TransactionId, cause: &LedgerError) {
        if let Err(e) = self
            .store
            .update_transaction_status(
                id,
                &[TransactionStatus::Pending],
                TransactionStatus::Failed,
                StatusUpdate::error(cause.annotation()),
            )
            .await
        {
            error!(transaction_id = %id, error = %e, "Failed to close rejected record");
        }
    }

    async fn result(&self, id: TransactionId) -> Result<TransactionResult, LedgerError> {
        Ok(TransactionResult::from(&self.store.get_transaction(id).await?))
    }
}
