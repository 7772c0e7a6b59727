//! Settlement Gateway
//!
//! Seam to the external payment/transfer provider. Whatever the provider
//! returns is mapped at this boundary into the closed [`GatewayOutcome`] union;
//! raw provider strings never reach the controller.
//!
//! # Outcome Rules
//! - `Success` / `Failed` are definitive. Only `Failed` on a debit-class
//!   operation may trigger compensation.
//! - `Ambiguous` (timeout, 5xx, malformed, still pending) must never be
//!   compensated automatically.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use super::types::TransactionKind;
use crate::money::Amount;

/// Outbound transfer instruction for a debit-class operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferInstruction {
    pub amount: Amount,
    pub destination: String,
    /// Our reference, unique per transaction (idempotent on the provider side)
    pub reference: String,
    pub kind: TransactionKind,
    pub narration: Option<String>,
}

/// Provider confirmation details
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GatewayReceipt {
    /// Provider-assigned id
    pub reference: Option<String>,
    /// Amount the provider reports (verification calls)
    pub amount: Option<Amount>,
    /// Raw provider payload, stored as transaction metadata
    pub payload: serde_json::Value,
}

/// Closed set of gateway outcomes
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome {
    /// Confirmed success
    Success(GatewayReceipt),
    /// Confirmed failure (safe to compensate)
    Failed(String),
    /// Unknown outcome (must NOT compensate)
    Ambiguous(String),
}

impl GatewayOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, GatewayOutcome::Success(_))
    }

    #[inline]
    pub fn is_confirmed_failure(&self) -> bool {
        matches!(self, GatewayOutcome::Failed(_))
    }

    #[inline]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, GatewayOutcome::Ambiguous(_))
    }
}

/// Classification of a provider status string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Failure,
    Ambiguous,
}

/// Map a provider status string onto [`StatusClass`]
///
/// Anything not explicitly known as final is ambiguous.
pub fn classify_status(status: &str) -> StatusClass {
    match status.trim().to_ascii_lowercase().as_str() {
        "success" | "successful" => StatusClass::Success,
        "failed" | "reversed" | "abandoned" => StatusClass::Failure,
        _ => StatusClass::Ambiguous,
    }
}

/// External settlement provider
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Send money out (withdrawal, bill purchase)
    async fn initiate_transfer(&self, instruction: &TransferInstruction) -> GatewayOutcome;

    /// Look up the final state of a previously initiated transfer
    async fn query_transfer(&self, reference: &str) -> GatewayOutcome;

    /// Confirm an inbound payment before crediting the wallet
    async fn verify_payment(&self, reference: &str) -> GatewayOutcome;
}

/// Bound a gateway call; elapsing is an ambiguous outcome, never a failure
pub async fn with_timeout<F>(limit: Duration, call: F) -> GatewayOutcome
where
    F: Future<Output = GatewayOutcome>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(outcome) => outcome,
        Err(_) => GatewayOutcome::Ambiguous(format!(
            "gateway did not answer within {}ms",
            limit.as_millis()
        )),
    }
}

/// Mock gateway for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted behavior for one gateway operation
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        Succeed,
        Fail,
        Ambiguous,
        /// Sleep before succeeding (exercise the timeout path)
        Hang(Duration),
    }

    pub struct MockGateway {
        transfer: Mutex<MockBehavior>,
        query: Mutex<MockBehavior>,
        verify: Mutex<MockBehavior>,
        verified_amount: Mutex<Option<Amount>>,
        transfer_count: AtomicUsize,
        query_count: AtomicUsize,
        verify_count: AtomicUsize,
        instructions: Mutex<Vec<TransferInstruction>>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self {
                transfer: Mutex::new(MockBehavior::Succeed),
                query: Mutex::new(MockBehavior::Succeed),
                verify: Mutex::new(MockBehavior::Succeed),
                verified_amount: Mutex::new(None),
                transfer_count: AtomicUsize::new(0),
                query_count: AtomicUsize::new(0),
                verify_count: AtomicUsize::new(0),
                instructions: Mutex::new(Vec::new()),
            }
        }

        pub fn set_transfer(&self, behavior: MockBehavior) {
            *self.transfer.lock().unwrap() = behavior;
        }

        pub fn set_query(&self, behavior: MockBehavior) {
            *self.query.lock().unwrap() = behavior;
        }

        pub fn set_verify(&self, behavior: MockBehavior, amount: Option<Amount>) {
            *self.verify.lock().unwrap() = behavior;
            *self.verified_amount.lock().unwrap() = amount;
        }

        pub fn transfer_count(&self) -> usize {
            self.transfer_count.load(Ordering::SeqCst)
        }

        pub fn query_count(&self) -> usize {
            self.query_count.load(Ordering::SeqCst)
        }

        pub fn verify_count(&self) -> usize {
            self.verify_count.load(Ordering::SeqCst)
        }

        pub fn instructions(&self) -> Vec<TransferInstruction> {
            self.instructions.lock().unwrap().clone()
        }

        async fn run(
            behavior: MockBehavior,
            reference: &str,
            amount: Option<Amount>,
        ) -> GatewayOutcome {
            match behavior {
                MockBehavior::Succeed => GatewayOutcome::Success(GatewayReceipt {
                    reference: Some(format!("GW-{}", reference)),
                    amount,
                    payload: serde_json::json!({ "status": "success", "reference": reference }),
                }),
                MockBehavior::Fail => GatewayOutcome::Failed("mock provider declined".into()),
                MockBehavior::Ambiguous => GatewayOutcome::Ambiguous("mock provider pending".into()),
                MockBehavior::Hang(delay) => {
                    tokio::time::sleep(delay).await;
                    GatewayOutcome::Success(GatewayReceipt {
                        reference: Some(format!("GW-{}", reference)),
                        amount,
                        payload: serde_json::Value::Null,
                    })
                }
            }
        }
    }

    impl Default for MockGateway {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl SettlementGateway for MockGateway {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn initiate_transfer(&self, instruction: &TransferInstruction) -> GatewayOutcome {
            self.transfer_count.fetch_add(1, Ordering::SeqCst);
            self.instructions.lock().unwrap().push(instruction.clone());
            let behavior = self.transfer.lock().unwrap().clone();
            Self::run(behavior, &instruction.reference, Some(instruction.amount)).await
        }

        async fn query_transfer(&self, reference: &str) -> GatewayOutcome {
            self.query_count.fetch_add(1, Ordering::SeqCst);
            let behavior = self.query.lock().unwrap().clone();
            Self::run(behavior, reference, None).await
        }

        async fn verify_payment(&self, reference: &str) -> GatewayOutcome {
            self.verify_count.fetch_add(1, Ordering::SeqCst);
            let behavior = self.verify.lock().unwrap().clone();
            let amount = *self.verified_amount.lock().unwrap();
            Self::run(behavior, reference, amount).await
        }
    }
}

#[cfg(test)]
pub use mock::{MockBehavior, MockGateway};
