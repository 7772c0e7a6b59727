//! End-to-end lifecycle tests
//!
//! Controller, compensation and reconciliation against the in-memory store,
//! a scripted gateway and a recording alert sink.

use std::sync::Arc;
use std::time::Duration;

use super::alert::{AlertKind, RecordingAlertSink};
use super::compensation::refund_key;
use super::controller::{ControllerConfig, TransactionController, receiver_key};
use super::error::LedgerError;
use super::gateway::{GatewayOutcome, GatewayReceipt, MockBehavior, MockGateway};
use super::memory::MemoryLedgerStore;
use super::state::TransactionStatus;
use super::store::{BalanceEffect, FaultyStore, LedgerStore, Settlement, StatusUpdate};
use super::types::{
    AccountId, CreditRequest, DebitRequest, GatewayParams, P2pRequest, TransactionDraft,
    TransactionKind,
};
use super::worker::{ReconciliationWorker, WorkerConfig};
use crate::cache::BalanceCache;
use crate::money::Amount;

const ALICE: AccountId = AccountId(1);
const BOB: AccountId = AccountId(2);

struct Harness {
    memory: Arc<MemoryLedgerStore>,
    store: Arc<FaultyStore>,
    gateway: Arc<MockGateway>,
    alerts: Arc<RecordingAlertSink>,
    controller: Arc<TransactionController>,
}

impl Harness {
    async fn new(balances: &[(AccountId, u64)]) -> Self {
        let memory = Arc::new(MemoryLedgerStore::new());
        for (account, balance) in balances {
            memory
                .open_account(*account, Amount::new(*balance))
                .await
                .unwrap();
        }
        let store = Arc::new(FaultyStore::new(memory.clone()));
        let gateway = Arc::new(MockGateway::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let controller = Arc::new(TransactionController::new(
            store.clone(),
            gateway.clone(),
            alerts.clone(),
            Arc::new(BalanceCache::new(60)),
            ControllerConfig {
                gateway_timeout: Duration::from_millis(100),
            },
        ));
        Self {
            memory,
            store,
            gateway,
            alerts,
            controller,
        }
    }

    async fn balance(&self, account: AccountId) -> Amount {
        self.store.get_balance(account).await.unwrap()
    }

    fn worker(&self, alert_after_retries: i32) -> ReconciliationWorker {
        ReconciliationWorker::new(
            self.controller.clone(),
            self.alerts.clone(),
            WorkerConfig {
                scan_interval: Duration::from_millis(10),
                stale_threshold: Duration::ZERO,
                batch_size: 50,
                alert_after_retries,
            },
        )
    }
}

fn withdrawal(amount: u64, fee: u64, key: &str) -> DebitRequest {
    DebitRequest {
        account_id: ALICE,
        kind: TransactionKind::Withdrawal,
        amount: Amount::new(amount),
        fee: Amount::new(fee),
        idempotency_key: key.to_string(),
        gateway: GatewayParams {
            destination: "RCP_alice".to_string(),
            narration: Some("cash out".to_string()),
        },
    }
}

fn p2p(amount: u64, key: &str) -> P2pRequest {
    P2pRequest {
        sender: ALICE,
        receiver: BOB,
        amount: Amount::new(amount),
        idempotency_key: key.to_string(),
    }
}

fn funding(amount: u64, reference: &str) -> CreditRequest {
    CreditRequest {
        account_id: ALICE,
        amount: Amount::new(amount),
        payment_reference: reference.to_string(),
    }
}

// ============================================================================
// Debit-class
// ============================================================================

#[tokio::test]
async fn test_insufficient_funds_rejected_without_side_effects() {
    let h = Harness::new(&[(ALICE, 1000)]).await;

    let result = h
        .controller
        .request_debit(withdrawal(1500, 0, "wd-1500"))
        .await
        .unwrap();

    assert_eq!(result.status, TransactionStatus::Failed);
    assert_eq!(result.error_code(), Some("INSUFFICIENT_FUNDS"));
    assert_eq!(result.new_balance, None);
    assert_eq!(h.balance(ALICE).await, Amount::new(1000));
    assert_eq!(h.gateway.transfer_count(), 0);
}

#[tokio::test]
async fn test_debit_success_and_replay() {
    let h = Harness::new(&[(ALICE, 1000)]).await;
    assert_eq!(h.controller.balance(ALICE).await.unwrap(), Amount::new(1000));

    let first = h
        .controller
        .request_debit(withdrawal(500, 0, "wd-500"))
        .await
        .unwrap();
    assert_eq!(first.status, TransactionStatus::Success);
    assert_eq!(first.new_balance, Some(Amount::new(500)));
    assert_eq!(first.error, None);
    assert_eq!(h.balance(ALICE).await, Amount::new(500));
    // Cached read sees the mutation
    assert_eq!(h.controller.balance(ALICE).await.unwrap(), Amount::new(500));

    let record = h.controller.transaction(first.transaction_id).await.unwrap();
    assert_eq!(
        record.external_reference,
        Some(format!("GW-{}", record.id))
    );
    assert_eq!(h.gateway.instructions()[0].reference, record.id.to_string());

    for _ in 0..3 {
        let replay = h
            .controller
            .request_debit(withdrawal(500, 0, "wd-500"))
            .await
            .unwrap();
        assert_eq!(replay, first);
    }
    assert_eq!(h.balance(ALICE).await, Amount::new(500));
    assert_eq!(h.gateway.transfer_count(), 1);
    assert_eq!(h.memory.transaction_count().unwrap(), 1);
}

#[tokio::test]
async fn test_confirmed_failure_refunds_amount_and_fee() {
    let h = Harness::new(&[(ALICE, 1000)]).await;
    h.gateway.set_transfer(MockBehavior::Fail);

    let result = h
        .controller
        .request_debit(withdrawal(500, 25, "wd-fail"))
        .await
        .unwrap();

    assert_eq!(result.status, TransactionStatus::FailedRefunded);
    assert_eq!(result.error_code(), Some("GATEWAY_FAILURE"));
    assert_eq!(result.new_balance, Some(Amount::new(1000)));
    assert_eq!(h.balance(ALICE).await, Amount::new(1000));

    let refund = h
        .store
        .find_by_idempotency_key(&refund_key(result.transaction_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refund.kind, TransactionKind::Refund);
    assert_eq!(refund.amount, Amount::new(525));
    assert_eq!(refund.status, TransactionStatus::Success);
    assert_eq!(refund.related_transaction_id, Some(result.transaction_id));
}

#[tokio::test]
async fn test_timeout_stays_processing_without_refund() {
    let h = Harness::new(&[(ALICE, 1000)]).await;
    h.gateway.set_transfer(MockBehavior::Hang(Duration::from_secs(5)));

    let result = h
        .controller
        .request_debit(withdrawal(500, 0, "wd-timeout"))
        .await
        .unwrap();

    assert_eq!(result.status, TransactionStatus::Processing);
    assert_eq!(result.error_code(), Some("GATEWAY_AMBIGUOUS"));
    assert_eq!(h.balance(ALICE).await, Amount::new(500));
    assert!(
        h.store
            .find_by_idempotency_key(&refund_key(result.transaction_id))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_ambiguous_then_webhook_success() {
    let h = Harness::new(&[(ALICE, 1000)]).await;
    h.gateway.set_transfer(MockBehavior::Ambiguous);

    let pending = h
        .controller
        .request_debit(withdrawal(400, 0, "wd-webhook"))
        .await
        .unwrap();
    assert_eq!(pending.status, TransactionStatus::Processing);

    let outcome = GatewayOutcome::Success(GatewayReceipt {
        reference: Some("TRF_99".into()),
        amount: Some(Amount::new(400)),
        payload: serde_json::json!({ "event": "transfer.success" }),
    });
    let settled = h
        .controller
        .apply_outcome(pending.transaction_id, outcome.clone())
        .await
        .unwrap();
    assert_eq!(settled.status, TransactionStatus::Success);
    assert_eq!(h.balance(ALICE).await, Amount::new(600));

    let record = h.controller.transaction(pending.transaction_id).await.unwrap();
    assert_eq!(record.external_reference.as_deref(), Some("TRF_99"));
    assert_eq!(record.metadata["event"], "transfer.success");

    // Terminal records ignore further outcomes
    let again = h
        .controller
        .apply_outcome(pending.transaction_id, GatewayOutcome::Failed("late".into()))
        .await
        .unwrap();
    assert_eq!(again.status, TransactionStatus::Success);
    assert_eq!(h.balance(ALICE).await, Amount::new(600));
}

#[tokio::test]
async fn test_ambiguous_then_webhook_failure_compensates_once() {
    let h = Harness::new(&[(ALICE, 1000)]).await;
    h.gateway.set_transfer(MockBehavior::Ambiguous);

    let pending = h
        .controller
        .request_debit(withdrawal(400, 0, "wd-webhook-fail"))
        .await
        .unwrap();

    for _ in 0..3 {
        h.controller
            .apply_outcome(pending.transaction_id, GatewayOutcome::Failed("reversed".into()))
            .await
            .unwrap();
    }
    let record = h.controller.transaction(pending.transaction_id).await.unwrap();
    assert_eq!(record.status, TransactionStatus::FailedRefunded);
    assert_eq!(h.balance(ALICE).await, Amount::new(1000));
    assert_eq!(h.memory.transactions_for(ALICE).unwrap().len(), 2);
}

#[tokio::test]
async fn test_reconcile_queries_gateway() {
    let h = Harness::new(&[(ALICE, 1000)]).await;
    h.gateway.set_transfer(MockBehavior::Ambiguous);
    let pending = h
        .controller
        .request_debit(withdrawal(300, 0, "wd-reconcile"))
        .await
        .unwrap();

    h.gateway.set_query(MockBehavior::Ambiguous);
    let still = h.controller.reconcile(pending.transaction_id).await.unwrap();
    assert_eq!(still.status, TransactionStatus::Processing);
    assert_eq!(h.balance(ALICE).await, Amount::new(700));

    h.gateway.set_query(MockBehavior::Succeed);
    let done = h.controller.reconcile(pending.transaction_id).await.unwrap();
    assert_eq!(done.status, TransactionStatus::Success);
    assert_eq!(h.gateway.query_count(), 2);
    assert_eq!(h.balance(ALICE).await, Amount::new(700));
}

#[tokio::test]
async fn test_request_validation() {
    let h = Harness::new(&[(ALICE, 1000)]).await;

    assert_eq!(
        h.controller.request_debit(withdrawal(0, 0, "wd-zero")).await,
        Err(LedgerError::InvalidAmount)
    );

    let mut no_destination = withdrawal(10, 0, "wd-nodest");
    no_destination.gateway.destination = "  ".into();
    assert!(matches!(
        h.controller.request_debit(no_destination).await,
        Err(LedgerError::Validation(_))
    ));

    let mut credit_kind = withdrawal(10, 0, "wd-kind");
    credit_kind.kind = TransactionKind::Credit;
    assert!(matches!(
        h.controller.request_debit(credit_kind).await,
        Err(LedgerError::Validation(_))
    ));

    assert!(matches!(
        h.controller.request_debit(withdrawal(10, 0, "bad key")).await,
        Err(LedgerError::Validation(_))
    ));

    assert_eq!(h.memory.transaction_count().unwrap(), 0);
    assert_eq!(h.balance(ALICE).await, Amount::new(1000));
}

#[tokio::test]
async fn test_key_reuse_for_different_operation_refused() {
    let h = Harness::new(&[(ALICE, 1000)]).await;
    h.controller
        .request_debit(withdrawal(100, 0, "wd-reuse"))
        .await
        .unwrap();

    assert!(matches!(
        h.controller.request_debit(withdrawal(200, 0, "wd-reuse")).await,
        Err(LedgerError::DuplicateOperation(_))
    ));
    assert_eq!(h.balance(ALICE).await, Amount::new(900));
}

#[tokio::test]
async fn test_key_reuse_with_different_fee_or_receiver_refused() {
    let h = Harness::new(&[(ALICE, 1000), (BOB, 0)]).await;
    h.controller
        .request_debit(withdrawal(100, 0, "wd-fee"))
        .await
        .unwrap();
    assert!(matches!(
        h.controller.request_debit(withdrawal(100, 5, "wd-fee")).await,
        Err(LedgerError::DuplicateOperation(_))
    ));

    let sent = h.controller.request_p2p(p2p(200, "p2p-reuse")).await.unwrap();
    assert_eq!(sent.status, TransactionStatus::Success);
    let mut elsewhere = p2p(200, "p2p-reuse");
    elsewhere.receiver = AccountId(3);
    assert!(matches!(
        h.controller.request_p2p(elsewhere).await,
        Err(LedgerError::DuplicateOperation(_))
    ));

    assert_eq!(h.balance(ALICE).await, Amount::new(700));
    assert_eq!(h.balance(BOB).await, Amount::new(200));
}

#[tokio::test]
async fn test_reserved_key_namespaces_refused() {
    let h = Harness::new(&[(ALICE, 1000), (BOB, 0)]).await;

    assert!(matches!(
        h.controller.request_debit(withdrawal(100, 0, "abc:recv")).await,
        Err(LedgerError::Validation(_))
    ));
    assert!(matches!(
        h.controller.request_p2p(p2p(100, "refund:abc")).await,
        Err(LedgerError::Validation(_))
    ));
    assert!(matches!(
        h.controller.request_credit(funding(100, "refund:PSK_1")).await,
        Err(LedgerError::Validation(_))
    ));

    assert_eq!(h.balance(ALICE).await, Amount::new(1000));
    assert_eq!(h.gateway.transfer_count(), 0);
    assert!(h.store.find_by_idempotency_key("abc:recv").await.unwrap().is_none());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_debits_never_overdraw() {
    let h = Harness::new(&[(ALICE, 1000)]).await;

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let controller = h.controller.clone();
            tokio::spawn(async move {
                controller
                    .request_debit(withdrawal(100, 0, &format!("wd-concurrent-{}", i)))
                    .await
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let rejected = results
        .iter()
        .filter(|r| r.error_code() == Some("INSUFFICIENT_FUNDS"))
        .count();
    assert_eq!(succeeded, 10);
    assert_eq!(rejected, 10);
    assert_eq!(h.balance(ALICE).await, Amount::ZERO);
    assert_eq!(h.gateway.transfer_count(), 10);
}

#[tokio::test]
async fn test_concurrent_replays_create_one_transaction() {
    let h = Harness::new(&[(ALICE, 1000)]).await;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let controller = h.controller.clone();
            tokio::spawn(async move {
                controller
                    .request_debit(withdrawal(500, 0, "wd-same-key"))
                    .await
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let id = results[0].transaction_id;
    assert!(results.iter().all(|r| r.transaction_id == id));
    assert_eq!(h.memory.transaction_count().unwrap(), 1);
    assert_eq!(h.gateway.transfer_count(), 1);
    assert_eq!(h.balance(ALICE).await, Amount::new(500));

    let settled = h
        .controller
        .request_debit(withdrawal(500, 0, "wd-same-key"))
        .await
        .unwrap();
    assert_eq!(settled.status, TransactionStatus::Success);
    assert_eq!(settled.transaction_id, id);
}

// ============================================================================
// P2P
// ============================================================================

#[tokio::test]
async fn test_p2p_success() {
    let h = Harness::new(&[(ALICE, 1000), (BOB, 0)]).await;

    let result = h.controller.request_p2p(p2p(300, "p2p-1")).await.unwrap();
    assert_eq!(result.status, TransactionStatus::Success);
    assert_eq!(result.new_balance, Some(Amount::new(700)));
    assert_eq!(h.balance(ALICE).await, Amount::new(700));
    assert_eq!(h.balance(BOB).await, Amount::new(300));
    assert_eq!(h.gateway.transfer_count(), 0);

    let leg = h
        .store
        .find_by_idempotency_key(&receiver_key("p2p-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(leg.kind, TransactionKind::P2pReceived);
    assert_eq!(leg.status, TransactionStatus::Success);
    assert_eq!(leg.amount, Amount::new(300));
    assert_eq!(leg.counterparty_account_id, Some(ALICE));
    assert_eq!(leg.related_transaction_id, Some(result.transaction_id));
    assert_eq!(leg.balance_after, Some(Amount::new(300)));

    let replay = h.controller.request_p2p(p2p(300, "p2p-1")).await.unwrap();
    assert_eq!(replay, result);
    assert_eq!(h.balance(BOB).await, Amount::new(300));
}

#[tokio::test]
async fn test_p2p_receiver_failure_refunds_sender() {
    let h = Harness::new(&[(ALICE, 1000), (BOB, 0)]).await;
    h.store.fail_credits_to(BOB);

    let result = h.controller.request_p2p(p2p(300, "p2p-fail")).await.unwrap();
    assert_eq!(result.status, TransactionStatus::FailedRefunded);
    assert_eq!(h.balance(ALICE).await, Amount::new(1000));
    assert_eq!(h.balance(BOB).await, Amount::ZERO);

    let leg = h
        .store
        .find_by_idempotency_key(&receiver_key("p2p-fail"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(leg.status, TransactionStatus::Failed);
    assert!(h.alerts.alerts().is_empty());
}

#[tokio::test]
async fn test_p2p_foreign_record_under_receiver_key_refunds_sender() {
    let h = Harness::new(&[(ALICE, 1000), (BOB, 0)]).await;

    // Settled record written straight to the store under the derived key
    let foreign = h
        .store
        .create_transaction(TransactionDraft::new(
            ALICE,
            TransactionKind::Withdrawal,
            Amount::new(100),
            receiver_key("p2p-held"),
        ))
        .await
        .unwrap();
    for (from, to) in [
        (TransactionStatus::Pending, TransactionStatus::Processing),
        (TransactionStatus::Processing, TransactionStatus::Success),
    ] {
        h.store
            .update_transaction_status(foreign.id, &[from], to, StatusUpdate::default())
            .await
            .unwrap();
    }

    let result = h.controller.request_p2p(p2p(300, "p2p-held")).await.unwrap();
    assert_eq!(result.status, TransactionStatus::FailedRefunded);
    assert_eq!(result.error_code(), Some("DUPLICATE_OPERATION"));
    assert_eq!(h.balance(ALICE).await, Amount::new(1000));
    assert_eq!(h.balance(BOB).await, Amount::ZERO);

    let untouched = h.store.get_transaction(foreign.id).await.unwrap();
    assert_eq!(untouched.status, TransactionStatus::Success);
    assert_eq!(untouched.kind, TransactionKind::Withdrawal);
}

#[tokio::test]
async fn test_p2p_committed_credit_with_lost_ack_not_refunded() {
    let h = Harness::new(&[(ALICE, 1000), (BOB, 0)]).await;
    h.store.lose_credit_acks_to(BOB);

    let result = h.controller.request_p2p(p2p(300, "p2p-lost-ack")).await.unwrap();
    assert_eq!(h.store.injected_failures(), 1);
    assert_eq!(result.status, TransactionStatus::Success);
    assert_eq!(h.balance(ALICE).await, Amount::new(700));
    assert_eq!(h.balance(BOB).await, Amount::new(300));

    let leg = h
        .store
        .find_by_idempotency_key(&receiver_key("p2p-lost-ack"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(leg.status, TransactionStatus::Success);
    assert!(
        h.store
            .find_by_idempotency_key(&refund_key(result.transaction_id))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_p2p_refund_failure_parks_sender_and_alerts() {
    let h = Harness::new(&[(ALICE, 1000), (BOB, 0)]).await;
    h.store.fail_credits_to(BOB);
    h.store.fail_credits_to(ALICE);

    let result = h.controller.request_p2p(p2p(300, "p2p-stuck")).await.unwrap();
    assert_eq!(result.status, TransactionStatus::RefundPending);
    assert_eq!(result.error_code(), Some("COMPENSATION_FAILURE"));
    assert_eq!(h.balance(ALICE).await, Amount::new(700));
    assert_eq!(h.alerts.count(AlertKind::CompensationFailed), 1);

    // Visible to reconciliation, and resolved once the store recovers
    h.store.heal();
    let resolved = h.controller.reconcile(result.transaction_id).await.unwrap();
    assert_eq!(resolved.status, TransactionStatus::FailedRefunded);
    assert_eq!(h.balance(ALICE).await, Amount::new(1000));
    assert_eq!(h.balance(BOB).await, Amount::ZERO);
}

#[tokio::test]
async fn test_p2p_rejections() {
    let h = Harness::new(&[(ALICE, 1000), (BOB, 0)]).await;

    let mut same = p2p(100, "p2p-self");
    same.receiver = ALICE;
    assert_eq!(
        h.controller.request_p2p(same).await,
        Err(LedgerError::SameAccount)
    );

    let mut unknown = p2p(100, "p2p-unknown");
    unknown.receiver = AccountId(99);
    assert_eq!(
        h.controller.request_p2p(unknown).await,
        Err(LedgerError::AccountNotFound(AccountId(99)))
    );
    assert_eq!(h.balance(ALICE).await, Amount::new(1000));

    let broke = h.controller.request_p2p(p2p(5000, "p2p-broke")).await.unwrap();
    assert_eq!(broke.status, TransactionStatus::Failed);
    assert_eq!(broke.error_code(), Some("INSUFFICIENT_FUNDS"));
    assert_eq!(h.balance(BOB).await, Amount::ZERO);
}

#[tokio::test]
async fn test_reconcile_completes_interrupted_p2p() {
    let h = Harness::new(&[(ALICE, 1000), (BOB, 0)]).await;

    // Sender debited, process died before the receiver leg
    let sender = h
        .store
        .create_transaction(
            TransactionDraft::new(ALICE, TransactionKind::P2pTransfer, Amount::new(250), "p2p-crash")
                .with_counterparty(BOB),
        )
        .await
        .unwrap();
    h.store
        .settle(
            Settlement::new(sender.id, &[TransactionStatus::Pending], TransactionStatus::Processing)
                .with_effect(BalanceEffect::Debit {
                    account: ALICE,
                    amount: Amount::new(250),
                }),
        )
        .await
        .unwrap();

    let result = h.controller.reconcile(sender.id).await.unwrap();
    assert_eq!(result.status, TransactionStatus::Success);
    assert_eq!(h.balance(ALICE).await, Amount::new(750));
    assert_eq!(h.balance(BOB).await, Amount::new(250));
}

// ============================================================================
// Credit-class
// ============================================================================

#[tokio::test]
async fn test_credit_verified_then_credited_once() {
    let h = Harness::new(&[(ALICE, 100)]).await;
    h.gateway.set_verify(MockBehavior::Succeed, Some(Amount::new(700)));

    let result = h
        .controller
        .request_credit(funding(700, "PAY_REF_1"))
        .await
        .unwrap();
    assert_eq!(result.status, TransactionStatus::Success);
    assert_eq!(result.new_balance, Some(Amount::new(800)));

    let replay = h
        .controller
        .request_credit(funding(700, "PAY_REF_1"))
        .await
        .unwrap();
    assert_eq!(replay, result);
    assert_eq!(h.gateway.verify_count(), 1);
    assert_eq!(h.balance(ALICE).await, Amount::new(800));
}

#[tokio::test]
async fn test_credit_amount_mismatch_not_credited() {
    let h = Harness::new(&[(ALICE, 100)]).await;
    h.gateway.set_verify(MockBehavior::Succeed, Some(Amount::new(500)));

    let result = h
        .controller
        .request_credit(funding(700, "PAY_REF_2"))
        .await
        .unwrap();
    assert_eq!(result.status, TransactionStatus::Processing);
    assert_eq!(result.error_code(), Some("GATEWAY_AMBIGUOUS"));
    assert_eq!(h.balance(ALICE).await, Amount::new(100));
    assert_eq!(h.alerts.count(AlertKind::AmountMismatch), 1);
}

#[tokio::test]
async fn test_credit_unconfirmed_payment() {
    let h = Harness::new(&[(ALICE, 100)]).await;

    h.gateway.set_verify(MockBehavior::Fail, None);
    let failed = h
        .controller
        .request_credit(funding(700, "PAY_REF_3"))
        .await
        .unwrap();
    assert_eq!(failed.status, TransactionStatus::Failed);
    assert_eq!(failed.error_code(), Some("GATEWAY_FAILURE"));

    h.gateway.set_verify(MockBehavior::Ambiguous, None);
    let pending = h
        .controller
        .request_credit(funding(200, "PAY_REF_4"))
        .await
        .unwrap();
    assert_eq!(pending.status, TransactionStatus::Processing);
    assert_eq!(h.balance(ALICE).await, Amount::new(100));

    h.gateway.set_verify(MockBehavior::Succeed, Some(Amount::new(200)));
    let credited = h.controller.reconcile(pending.transaction_id).await.unwrap();
    assert_eq!(credited.status, TransactionStatus::Success);
    assert_eq!(h.balance(ALICE).await, Amount::new(300));

    // A second reconcile cannot credit again
    h.controller.reconcile(pending.transaction_id).await.unwrap();
    assert_eq!(h.balance(ALICE).await, Amount::new(300));
}

// ============================================================================
// Reconciliation worker
// ============================================================================

#[tokio::test]
async fn test_worker_resolves_confirmed_failure() {
    let h = Harness::new(&[(ALICE, 1000)]).await;
    h.gateway.set_transfer(MockBehavior::Ambiguous);
    let pending = h
        .controller
        .request_debit(withdrawal(600, 0, "wd-worker"))
        .await
        .unwrap();

    h.gateway.set_query(MockBehavior::Fail);
    let report = h.worker(5).scan_and_reconcile().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.advanced, 1);

    let record = h.controller.transaction(pending.transaction_id).await.unwrap();
    assert_eq!(record.status, TransactionStatus::FailedRefunded);
    assert_eq!(h.balance(ALICE).await, Amount::new(1000));

    // Nothing left to scan
    let report = h.worker(5).scan_and_reconcile().await.unwrap();
    assert_eq!(report.scanned, 0);
}

#[tokio::test]
async fn test_worker_alerts_when_stuck() {
    let h = Harness::new(&[(ALICE, 1000)]).await;
    h.gateway.set_transfer(MockBehavior::Ambiguous);
    h.gateway.set_query(MockBehavior::Ambiguous);
    let pending = h
        .controller
        .request_debit(withdrawal(100, 0, "wd-stuck"))
        .await
        .unwrap();

    let worker = h.worker(1);
    for _ in 0..3 {
        let report = worker.scan_and_reconcile().await.unwrap();
        assert_eq!(report.unchanged, 1);
    }

    let record = h.controller.transaction(pending.transaction_id).await.unwrap();
    assert_eq!(record.retry_count, 3);
    assert_eq!(record.status, TransactionStatus::Processing);
    assert_eq!(h.alerts.count(AlertKind::ReconciliationStuck), 1);
    assert_eq!(h.balance(ALICE).await, Amount::new(900));
}

#[tokio::test]
async fn test_worker_closes_abandoned_pending() {
    let h = Harness::new(&[(ALICE, 1000)]).await;
    let orphan = h
        .store
        .create_transaction(TransactionDraft::new(
            ALICE,
            TransactionKind::Airtime,
            Amount::new(100),
            "airtime-orphan",
        ))
        .await
        .unwrap();

    let report = h.worker(5).scan_and_reconcile().await.unwrap();
    assert_eq!(report.advanced, 1);

    let record = h.controller.transaction(orphan.id).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Failed);
    assert_eq!(h.balance(ALICE).await, Amount::new(1000));
    assert_eq!(h.gateway.transfer_count(), 0);
}
