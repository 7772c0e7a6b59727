//! Reconciliation Worker
//!
//! Background worker that scans for records stuck in a reconcilable status
//! (`pending`, `processing`, `refund_pending`) and drives them forward through
//! [`TransactionController::reconcile`].

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::alert::{Alert, AlertKind, AlertSink};
use super::controller::TransactionController;
use super::error::LedgerError;
use super::state::TransactionStatus;
use super::store::LedgerStore;
use crate::config::WorkerSettings;

/// Statuses the scan picks up
pub const RECONCILABLE: [TransactionStatus; 3] = [
    TransactionStatus::Pending,
    TransactionStatus::Processing,
    TransactionStatus::RefundPending,
];

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to scan
    pub scan_interval: Duration,
    /// How long a record must sit untouched to be considered stuck
    pub stale_threshold: Duration,
    /// Maximum records per scan
    pub batch_size: usize,
    /// Raise `ReconciliationStuck` once a record's retries exceed this
    pub alert_after_retries: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(60),
            batch_size: 100,
            alert_after_retries: 10,
        }
    }
}

impl From<&WorkerSettings> for WorkerConfig {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            scan_interval: Duration::from_secs(settings.scan_interval_secs),
            stale_threshold: Duration::from_secs(settings.stale_threshold_secs),
            batch_size: settings.batch_size,
            alert_after_retries: settings.alert_after_retries,
        }
    }
}

/// Outcome of one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub scanned: usize,
    /// Records whose status moved
    pub advanced: usize,
    /// Records left where they were
    pub unchanged: usize,
}

pub struct ReconciliationWorker {
    controller: Arc<TransactionController>,
    store: Arc<dyn LedgerStore>,
    alerts: Arc<dyn AlertSink>,
    config: WorkerConfig,
}

impl ReconciliationWorker {
    pub fn new(
        controller: Arc<TransactionController>,
        alerts: Arc<dyn AlertSink>,
        config: WorkerConfig,
    ) -> Self {
        let store = controller.store().clone();
        Self {
            controller,
            store,
            alerts,
            config,
        }
    }

    /// Run the worker loop forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            stale_threshold_secs = self.config.stale_threshold.as_secs(),
            batch_size = self.config.batch_size,
            "Starting reconciliation worker"
        );

        loop {
            if let Err(e) = self.scan_and_reconcile().await {
                error!(error = %e, "Reconciliation scan failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single scan
    pub async fn scan_and_reconcile(&self) -> Result<ScanReport, LedgerError> {
        let stale = self
            .store
            .find_stale(&RECONCILABLE, self.config.stale_threshold, self.config.batch_size)
            .await?;

        if stale.is_empty() {
            debug!("No stale transactions found");
            return Ok(ScanReport::default());
        }
        info!(count = stale.len(), "Found stale transactions to reconcile");

        let mut report = ScanReport {
            scanned: stale.len(),
            ..Default::default()
        };

        for tx in &stale {
            debug!(
                transaction_id = %tx.id,
                status = %tx.status,
                retry_count = tx.retry_count,
                "Reconciling transaction"
            );

            let advanced = match self.controller.reconcile(tx.id).await {
                Ok(result) if result.status != tx.status => {
                    info!(
                        transaction_id = %tx.id,
                        old_status = %tx.status,
                        new_status = %result.status,
                        "Transaction reconciled"
                    );
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    error!(transaction_id = %tx.id, error = %e, "Failed to reconcile transaction");
                    false
                }
            };

            if advanced {
                report.advanced += 1;
                continue;
            }
            report.unchanged += 1;

            if let Err(e) = self.store.increment_retry(tx.id).await {
                warn!(transaction_id = %tx.id, error = %e, "Failed to bump retry count");
                continue;
            }
            let retries = tx.retry_count + 1;
            if retries == self.config.alert_after_retries + 1 {
                self.alerts
                    .raise(Alert::new(
                        AlertKind::ReconciliationStuck,
                        tx.id,
                        tx.account_id,
                        format!("{} after {} reconciliation attempts", tx.status, retries),
                    ))
                    .await;
            }
        }

        if report.advanced > 0 {
            info!(count = report.advanced, "Reconciled transactions this scan");
        }
        Ok(report)
    }
}
