//! Wallet gateway integration: webhook authentication and event parsing.
//!
//! The gateway signs every webhook body with a shared secret; nothing in
//! the payload is trusted until that signature checks out. The event
//! itself only carries the signed intent reference, the reported amount
//! and the provider's transaction id — the reconciliation listener does
//! the rest.

use crate::config::GatewayConfig;
use anyhow::Result;
use secrecy::ExposeSecret;
use serde::Deserialize;
use service_core::utils::signature;

/// Signature header set by the gateway on webhook deliveries.
pub const GATEWAY_SIGNATURE_HEADER: &str = "X-Gateway-Signature";

#[derive(Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
}

/// A webhook event as delivered by the gateway.
#[derive(Debug, Deserialize)]
pub struct GatewayEvent {
    /// Event type, e.g. `deposit.completed`.
    pub event: String,
    pub payload: GatewayEventPayload,
}

#[derive(Debug, Deserialize)]
pub struct GatewayEventPayload {
    /// Signed intent reference issued at intent creation.
    pub intent_ref: String,
    /// Reported amount in minor units.
    pub amount: i64,
    /// Provider-side transaction id.
    pub external_txn_id: String,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Provider name, used as the channel suffix on gateway deposits.
    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    /// Verify the HMAC signature the gateway computed over the raw body.
    pub fn verify_webhook_signature(&self, body: &str, signature: &str) -> Result<bool> {
        signature::verify(self.config.webhook_secret.expose_secret(), body, signature)
    }

    /// Parse a verified webhook body.
    pub fn parse_webhook_event(&self, body: &str) -> Result<GatewayEvent> {
        serde_json::from_str(body).map_err(|e| anyhow::anyhow!("Invalid webhook payload: {}", e))
    }
}
