//! HTTP Settlement Gateway
//!
//! Provider client speaking a Paystack-style JSON API:
//! - `POST {base}/transfer` initiates an outbound transfer
//! - `GET {base}/transfer/verify/{reference}` queries a transfer
//! - `GET {base}/transaction/verify/{reference}` verifies an inbound payment
//!
//! Responses are classified by [`classify_response`], a pure function so the
//! mapping is testable without a network.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::gateway::{
    GatewayOutcome, GatewayReceipt, SettlementGateway, StatusClass, TransferInstruction,
    classify_status,
};
use crate::config::GatewayConfig;
use crate::money::Amount;

#[derive(Serialize)]
struct TransferBody<'a> {
    source: &'static str,
    /// Minor units
    amount: u64,
    recipient: &'a str,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
struct Envelope {
    #[serde(default)]
    message: String,
    data: Option<EnvelopeData>,
}

#[derive(Deserialize, Debug)]
struct EnvelopeData {
    status: Option<String>,
    reference: Option<String>,
    transfer_code: Option<String>,
    amount: Option<u64>,
    gateway_response: Option<String>,
}

/// Map an HTTP status and body onto the closed outcome set
///
/// - 408, 429, 5xx and anything outside 2xx/4xx: ambiguous
/// - other 4xx: confirmed failure (the provider refused the request)
/// - 2xx: decided by `data.status`; a missing or malformed body is ambiguous
pub fn classify_response(http_status: u16, body: &str) -> GatewayOutcome {
    match http_status {
        408 | 429 => {
            return GatewayOutcome::Ambiguous(format!("provider returned HTTP {}", http_status));
        }
        400..=499 => {
            let reason = serde_json::from_str::<Envelope>(body)
                .ok()
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("provider rejected request with HTTP {}", http_status));
            return GatewayOutcome::Failed(reason);
        }
        200..=299 => {}
        _ => {
            return GatewayOutcome::Ambiguous(format!("provider returned HTTP {}", http_status));
        }
    }

    let payload: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return GatewayOutcome::Ambiguous(format!("malformed provider body: {}", e)),
    };
    let envelope: Envelope = match serde_json::from_value(payload.clone()) {
        Ok(e) => e,
        Err(e) => return GatewayOutcome::Ambiguous(format!("unexpected provider body: {}", e)),
    };
    let Some(data) = envelope.data else {
        return GatewayOutcome::Ambiguous("provider body has no data".into());
    };
    let status = data.status.as_deref().unwrap_or_default();

    match classify_status(status) {
        StatusClass::Success => GatewayOutcome::Success(GatewayReceipt {
            reference: data.transfer_code.or(data.reference),
            amount: data.amount.map(Amount::new),
            payload,
        }),
        StatusClass::Failure => GatewayOutcome::Failed(
            data.gateway_response
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| format!("provider status {}", status)),
        ),
        StatusClass::Ambiguous => {
            GatewayOutcome::Ambiguous(format!("provider status '{}' is not final", status))
        }
    }
}

/// reqwest-backed [`SettlementGateway`]
pub struct HttpSettlementGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpSettlementGateway {
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build gateway HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder, op: &str) -> GatewayOutcome {
        let response = match request.bearer_auth(&self.secret_key).send().await {
            Ok(r) => r,
            Err(e) => {
                // Sent or not, we cannot tell; never treat as failure
                warn!(op = %op, error = %e, "Gateway transport error");
                return GatewayOutcome::Ambiguous(format!("transport error: {}", e));
            }
        };
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!(op = %op, status, error = %e, "Gateway body read failed");
                return GatewayOutcome::Ambiguous(format!("body read failed: {}", e));
            }
        };
        let outcome = classify_response(status, &body);
        debug!(op = %op, status, outcome = ?outcome, "Gateway response");
        outcome
    }
}

#[async_trait]
impl SettlementGateway for HttpSettlementGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn initiate_transfer(&self, instruction: &TransferInstruction) -> GatewayOutcome {
        let body = TransferBody {
            source: "balance",
            amount: instruction.amount.minor_units(),
            recipient: &instruction.destination,
            reference: &instruction.reference,
            reason: instruction.narration.as_deref(),
        };
        let request = self
            .client
            .post(format!("{}/transfer", self.base_url))
            .json(&body);
        self.send(request, "initiate_transfer").await
    }

    async fn query_transfer(&self, reference: &str) -> GatewayOutcome {
        let request = self
            .client
            .get(format!("{}/transfer/verify/{}", self.base_url, reference));
        self.send(request, "query_transfer").await
    }

    async fn verify_payment(&self, reference: &str) -> GatewayOutcome {
        let request = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference));
        self.send(request, "verify_payment").await
    }
}
