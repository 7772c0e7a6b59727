//! Transaction Status State Machine
//!
//! Status IDs are stored as SMALLINT in `transactions.status`.
//!
//! ```text
//! PENDING → PROCESSING → SUCCESS
//!    │          ├──────→ FAILED_REFUNDED
//!    │          ├──────→ REFUND_PENDING → FAILED_REFUNDED
//!    │          └──────→ FAILED          (credit-class, nothing to refund)
//!    ├────────→ SUCCESS                  (internal credit leg)
//!    └────────→ FAILED                   (rejected, no side effects)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction lifecycle status
///
/// Terminal: SUCCESS (40), FAILED (-10), FAILED_REFUNDED (-30).
/// REFUND_PENDING (-20) is reconcilable: a refund is owed but not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum TransactionStatus {
    /// Request accepted and recorded, no balance effect yet
    Pending = 0,

    /// Local effect applied (debit-class) or external call dispatched
    /// (credit-class); outcome not yet known
    Processing = 10,

    /// Terminal: money movement completed
    Success = 40,

    /// Terminal: rejected or confirmed failure with nothing to undo
    Failed = -10,

    /// Refund owed to the account but not applied yet (needs attention)
    RefundPending = -20,

    /// Terminal: external leg failed and the debit was credited back
    FailedRefunded = -30,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 6] = [
        TransactionStatus::Pending,
        TransactionStatus::Processing,
        TransactionStatus::Success,
        TransactionStatus::Failed,
        TransactionStatus::RefundPending,
        TransactionStatus::FailedRefunded,
    ];

    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Success
                | TransactionStatus::Failed
                | TransactionStatus::FailedRefunded
        )
    }

    /// Forward-only transition table
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Success)
                | (Pending, Failed)
                | (Processing, Success)
                | (Processing, Failed)
                | (Processing, FailedRefunded)
                | (Processing, RefundPending)
                | (RefundPending, FailedRefunded)
        )
    }

    /// Get the numeric status ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL status ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransactionStatus::Pending),
            10 => Some(TransactionStatus::Processing),
            40 => Some(TransactionStatus::Success),
            -10 => Some(TransactionStatus::Failed),
            -20 => Some(TransactionStatus::RefundPending),
            -30 => Some(TransactionStatus::FailedRefunded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::RefundPending => "refund_pending",
            TransactionStatus::FailedRefunded => "failed_refunded",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i16> for TransactionStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransactionStatus::from_id(value).ok_or(())
    }
}
