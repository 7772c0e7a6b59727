//! Ledger Core Types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::LedgerError;
use super::state::TransactionStatus;
use crate::money::Amount;

/// Maximum idempotency key length (bytes)
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Suffix of the key the ledger derives for a P2P receiver leg
pub const RECEIVER_KEY_SUFFIX: &str = ":recv";

/// Prefix of the key the ledger derives for a refund record
pub const REFUND_KEY_PREFIX: &str = "refund:";

/// Wallet account identifier (one account per user)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl AccountId {
    /// Signed storage representation (`BIGINT`)
    pub fn to_storage(self) -> Result<i64, LedgerError> {
        i64::try_from(self.0)
            .map_err(|_| LedgerError::Validation(format!("account id out of range: {}", self.0)))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction ID - ULID based, sortable by creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(ulid::Ulid);

impl TransactionId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for TransactionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What a transaction does to its owner's balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Debit,
    Credit,
    Fee,
    P2pTransfer,
    P2pReceived,
    Withdrawal,
    Airtime,
    Data,
    Electricity,
    CableTv,
    /// Compensating credit referencing a failed debit
    Refund,
}

impl TransactionKind {
    /// Reduces the owner's balance
    pub fn is_debit_class(&self) -> bool {
        !self.is_credit_class()
    }

    /// Increases the owner's balance
    pub fn is_credit_class(&self) -> bool {
        matches!(
            self,
            TransactionKind::Credit | TransactionKind::P2pReceived | TransactionKind::Refund
        )
    }

    /// Bill-payment purchase categories
    pub fn is_purchase(&self) -> bool {
        matches!(
            self,
            TransactionKind::Airtime
                | TransactionKind::Data
                | TransactionKind::Electricity
                | TransactionKind::CableTv
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Debit => "debit",
            TransactionKind::Credit => "credit",
            TransactionKind::Fee => "fee",
            TransactionKind::P2pTransfer => "p2p_transfer",
            TransactionKind::P2pReceived => "p2p_received",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Airtime => "airtime",
            TransactionKind::Data => "data",
            TransactionKind::Electricity => "electricity",
            TransactionKind::CableTv => "cable_tv",
            TransactionKind::Refund => "refund",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "debit" => TransactionKind::Debit,
            "credit" => TransactionKind::Credit,
            "fee" => TransactionKind::Fee,
            "p2p_transfer" => TransactionKind::P2pTransfer,
            "p2p_received" => TransactionKind::P2pReceived,
            "withdrawal" => TransactionKind::Withdrawal,
            "airtime" => TransactionKind::Airtime,
            "data" => TransactionKind::Data,
            "electricity" => TransactionKind::Electricity,
            "cable_tv" => TransactionKind::CableTv,
            "refund" => TransactionKind::Refund,
            other => {
                return Err(LedgerError::Validation(format!(
                    "unknown transaction kind: {}",
                    other
                )));
            }
        })
    }
}

/// Format checks shared by caller keys and derived keys
pub fn validate_idempotency_key(key: &str) -> Result<(), LedgerError> {
    if key.is_empty() {
        return Err(LedgerError::Validation("idempotency key is empty".into()));
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(LedgerError::Validation(format!(
            "idempotency key longer than {} bytes",
            MAX_IDEMPOTENCY_KEY_LEN
        )));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(LedgerError::Validation(
            "idempotency key contains whitespace or control characters".into(),
        ));
    }
    Ok(())
}

/// Validate a caller-supplied key; the derived-key namespaces are refused
pub fn validate_client_key(key: &str) -> Result<(), LedgerError> {
    validate_idempotency_key(key)?;
    if key.ends_with(RECEIVER_KEY_SUFFIX) || key.starts_with(REFUND_KEY_PREFIX) {
        return Err(LedgerError::Validation(format!(
            "idempotency key {} uses a reserved namespace",
            key
        )));
    }
    Ok(())
}

/// A transaction about to be recorded (always created as PENDING)
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub account_id: AccountId,
    pub counterparty_account_id: Option<AccountId>,
    pub related_transaction_id: Option<TransactionId>,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub fee: Amount,
    pub idempotency_key: String,
    pub external_reference: Option<String>,
    pub metadata: serde_json::Value,
}

impl TransactionDraft {
    pub fn new(
        account_id: AccountId,
        kind: TransactionKind,
        amount: Amount,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            counterparty_account_id: None,
            related_transaction_id: None,
            kind,
            amount,
            fee: Amount::ZERO,
            idempotency_key: idempotency_key.into(),
            external_reference: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_fee(mut self, fee: Amount) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_counterparty(mut self, counterparty: AccountId) -> Self {
        self.counterparty_account_id = Some(counterparty);
        self
    }

    pub fn with_related(mut self, related: TransactionId) -> Self {
        self.related_transaction_id = Some(related);
        self
    }

    pub fn with_external_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// `amount + fee` for debit-class kinds, `0` for credit-class kinds
    pub fn total_deduction(&self) -> Result<Amount, LedgerError> {
        if self.kind.is_credit_class() {
            return Ok(Amount::ZERO);
        }
        let total = self
            .amount
            .checked_add(self.fee)
            .ok_or(LedgerError::Overflow)?;
        if total > Amount::MAX_STORABLE {
            return Err(LedgerError::Overflow);
        }
        Ok(total)
    }

    /// Amount/fee/key checks shared by every store
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        if self.amount > Amount::MAX_STORABLE || self.fee > Amount::MAX_STORABLE {
            return Err(LedgerError::Overflow);
        }
        if self.kind.is_credit_class() && !self.fee.is_zero() {
            return Err(LedgerError::Validation(
                "fees are only charged on debit-class transactions".into(),
            ));
        }
        self.total_deduction()?;
        validate_idempotency_key(&self.idempotency_key)
    }

    /// Materialize the draft as a fresh PENDING record
    pub fn into_transaction(self) -> Result<Transaction, LedgerError> {
        self.validate()?;
        let total_deduction = self.total_deduction()?;
        let now = chrono::Utc::now().timestamp_millis();
        Ok(Transaction {
            id: TransactionId::new(),
            account_id: self.account_id,
            counterparty_account_id: self.counterparty_account_id,
            related_transaction_id: self.related_transaction_id,
            kind: self.kind,
            amount: self.amount,
            fee: self.fee,
            total_deduction,
            status: TransactionStatus::Pending,
            idempotency_key: self.idempotency_key,
            external_reference: self.external_reference,
            balance_after: None,
            error: None,
            metadata: self.metadata,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Ledger transaction record
///
/// Immutable once terminal; only status and annotations change before that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Owner account
    pub account_id: AccountId,
    /// Other side of a P2P transfer
    pub counterparty_account_id: Option<AccountId>,
    /// Linked record (receiver leg, refunded original)
    pub related_transaction_id: Option<TransactionId>,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub fee: Amount,
    /// `amount + fee` for debit-class, zero for credit-class
    pub total_deduction: Amount,
    pub status: TransactionStatus,
    pub idempotency_key: String,
    /// Gateway-assigned id, set once confirmed
    pub external_reference: Option<String>,
    /// Owner balance right after this record's balance effect
    pub balance_after: Option<Amount>,
    /// Last error annotation (`CODE: message`)
    pub error: Option<String>,
    /// Opaque provider payload
    pub metadata: serde_json::Value,
    pub retry_count: i32,
    /// Created timestamp (millis)
    pub created_at: i64,
    /// Last updated timestamp (millis)
    pub updated_at: i64,
}

impl Transaction {
    /// Balance change this record applies to its owner
    pub fn balance_effect_amount(&self) -> Amount {
        if self.kind.is_debit_class() {
            self.total_deduction
        } else {
            self.amount
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction[{}] {} account={} amount={} fee={} status={}",
            self.id, self.kind, self.account_id, self.amount, self.fee, self.status
        )
    }
}

/// Outcome returned to callers
///
/// Derived only from the persisted record, so a replay with the same
/// idempotency key yields an identical value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub status: TransactionStatus,
    pub transaction_id: TransactionId,
    pub new_balance: Option<Amount>,
    pub error: Option<String>,
}

impl From<&Transaction> for TransactionResult {
    fn from(tx: &Transaction) -> Self {
        Self {
            status: tx.status,
            transaction_id: tx.id,
            new_balance: tx.balance_after,
            error: tx.error.clone(),
        }
    }
}

impl TransactionResult {
    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    /// Error code prefix of the persisted annotation
    pub fn error_code(&self) -> Option<&str> {
        self.error
            .as_deref()
            .map(|e| e.split_once(':').map_or(e, |(code, _)| code))
    }
}

/// Where the gateway should send a debit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayParams {
    /// Recipient code, biller id or phone number
    pub destination: String,
    #[serde(default)]
    pub narration: Option<String>,
}

/// Debit-class request (withdrawal, purchase, fee)
#[derive(Debug, Clone)]
pub struct DebitRequest {
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub fee: Amount,
    pub idempotency_key: String,
    pub gateway: GatewayParams,
}

/// Credit-class request (wallet funding, verified by payment reference)
#[derive(Debug, Clone)]
pub struct CreditRequest {
    pub account_id: AccountId,
    pub amount: Amount,
    /// Gateway payment reference, doubles as idempotency key
    pub payment_reference: String,
}

/// Wallet-to-wallet transfer request
#[derive(Debug, Clone)]
pub struct P2pRequest {
    pub sender: AccountId,
    pub receiver: AccountId,
    pub amount: Amount,
    pub idempotency_key: String,
}
