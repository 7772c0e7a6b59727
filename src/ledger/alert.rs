//! Operator alerts
//!
//! Raised when money may be stranded and a human has to look: a refund that
//! could not be applied, a record that reconciliation cannot resolve, or a
//! provider reporting a different amount than the ledger expects.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::error;

use super::types::{AccountId, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CompensationFailed,
    ReconciliationStuck,
    AmountMismatch,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::CompensationFailed => "compensation_failed",
            AlertKind::ReconciliationStuck => "reconciliation_stuck",
            AlertKind::AmountMismatch => "amount_mismatch",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub detail: String,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        transaction_id: TransactionId,
        account_id: AccountId,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            transaction_id,
            account_id,
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: Alert);
}

/// Emits alerts as `ERROR` events on the `ops_alert` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn raise(&self, alert: Alert) {
        error!(
            target: "ops_alert",
            kind = %alert.kind,
            transaction_id = %alert.transaction_id,
            account_id = %alert.account_id,
            detail = %alert.detail,
            "Operator attention required"
        );
    }
}


#[cfg(test)]
pub use mock::RecordingAlertSink;
