//! Ledger Error Types
//!
//! Error codes are stable strings for API responses and for the `error`
//! annotation persisted on transaction records.

use thiserror::Error;

use super::state::TransactionStatus;
use super::types::AccountId;
use crate::money::{Amount, MoneyError};

/// Ledger error taxonomy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // === Validation Errors (no side effect) ===
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Amount would cause overflow")]
    Overflow,

    #[error("Sender and receiver account cannot be the same")]
    SameAccount,

    // === Funds (no side effect) ===
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Amount, requested: Amount },

    // === Idempotency ===
    #[error("Operation already processed: {0}")]
    DuplicateOperation(String),

    // === Gateway ===
    #[error("Gateway rejected the operation: {0}")]
    GatewayFailure(String),

    #[error("Gateway outcome unknown: {0}")]
    GatewayAmbiguous(String),

    // === Compensation ===
    #[error("Refund failed, manual intervention required: {0}")]
    CompensationFailure(String),

    // === Storage ===
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Concurrent write detected: {0}")]
    StorageConflict(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Database error: {0}")]
    Database(String),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::InvalidAmount => "INVALID_AMOUNT",
            LedgerError::Overflow => "OVERFLOW",
            LedgerError::SameAccount => "SAME_ACCOUNT",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::DuplicateOperation(_) => "DUPLICATE_OPERATION",
            LedgerError::GatewayFailure(_) => "GATEWAY_FAILURE",
            LedgerError::GatewayAmbiguous(_) => "GATEWAY_AMBIGUOUS",
            LedgerError::CompensationFailure(_) => "COMPENSATION_FAILURE",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            LedgerError::StorageConflict(_) => "STORAGE_CONFLICT",
            LedgerError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            LedgerError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::Validation(_)
            | LedgerError::InvalidAmount
            | LedgerError::Overflow
            | LedgerError::SameAccount => 400,
            LedgerError::AccountNotFound(_) | LedgerError::TransactionNotFound(_) => 404,
            LedgerError::DuplicateOperation(_) | LedgerError::StorageConflict(_) => 409,
            LedgerError::InsufficientFunds { .. } => 422,
            LedgerError::GatewayFailure(_) => 502,
            LedgerError::GatewayAmbiguous(_) => 202,
            LedgerError::CompensationFailure(_)
            | LedgerError::InvalidStateTransition { .. }
            | LedgerError::Database(_) => 500,
        }
    }

    /// Whether the caller may safely retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::StorageConflict(_) | LedgerError::Database(_)
        )
    }

    /// Persisted form: `CODE: message`
    pub fn annotation(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}

impl From<MoneyError> for LedgerError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::InvalidAmount => LedgerError::InvalidAmount,
            MoneyError::Overflow => LedgerError::Overflow,
            other => LedgerError::Validation(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            return LedgerError::DuplicateOperation(db_err.message().to_string());
        }
        LedgerError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LedgerError::InsufficientFunds {
                available: Amount::new(1000),
                requested: Amount::new(1500),
            }
            .code(),
            "INSUFFICIENT_FUNDS"
        );
        assert_eq!(LedgerError::SameAccount.code(), "SAME_ACCOUNT");
        assert_eq!(
            LedgerError::CompensationFailure("x".into()).code(),
            "COMPENSATION_FAILURE"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(LedgerError::InvalidAmount.http_status(), 400);
        assert_eq!(LedgerError::AccountNotFound(AccountId(7)).http_status(), 404);
        assert_eq!(LedgerError::StorageConflict("x".into()).http_status(), 409);
        assert_eq!(LedgerError::GatewayAmbiguous("timeout".into()).http_status(), 202);
        assert_eq!(LedgerError::Database("down".into()).http_status(), 500);
    }

    #[test]
    fn test_retryable() {
        assert!(LedgerError::StorageConflict("cas".into()).is_retryable());
        assert!(!LedgerError::InvalidAmount.is_retryable());
        assert!(!LedgerError::GatewayAmbiguous("timeout".into()).is_retryable());
    }

    #[test]
    fn test_annotation() {
        let err = LedgerError::InsufficientFunds {
            available: Amount::new(1000),
            requested: Amount::new(1500),
        };
        assert_eq!(
            err.annotation(),
            "INSUFFICIENT_FUNDS: Insufficient funds: available 10.00, requested 15.00"
        );
    }

    #[test]
    fn test_from_money_error() {
        assert_eq!(
            LedgerError::from(MoneyError::InvalidAmount),
            LedgerError::InvalidAmount
        );
        assert!(matches!(
            LedgerError::from(MoneyError::InvalidFormat("x".into())),
            LedgerError::Validation(_)
        ));
    }
}
