//! Gateway webhook: the provider-push transport into reconciliation.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use service_core::error::AppError;

use crate::dtos::ReconcileResponse;
use crate::services::gateway::GATEWAY_SIGNATURE_HEADER;
use crate::AppState;

/// Handle a signed webhook delivery from the wallet gateway.
///
/// Redeliveries are expected and harmless: the reconciliation listener
/// answers duplicates with the originally committed outcome.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<Option<ReconcileResponse>>), AppError> {
    let signature = headers
        .get(GATEWAY_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing gateway webhook signature header");
            AppError::Unauthorized(anyhow::anyhow!("Missing webhook signature"))
        })?;

    let is_valid = state
        .gateway
        .verify_webhook_signature(&body, signature)
        .map_err(|e| {
            tracing::error!(error = %e, "Webhook signature verification error");
            AppError::InternalError(anyhow::anyhow!("Webhook verification failed"))
        })?;

    if !is_valid {
        tracing::warn!("Invalid gateway webhook signature");
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid webhook signature"
        )));
    }

    let event = state.gateway.parse_webhook_event(&body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse webhook event");
        AppError::BadRequest(anyhow::anyhow!("Invalid webhook payload"))
    })?;

    tracing::info!(event_type = %event.event, "Processing gateway webhook");

    match event.event.as_str() {
        "deposit.completed" => {
            let intent_ref = state.intents.parse_reference(&event.payload.intent_ref)?;

            // The signature already authenticated the gateway itself, so no
            // per-account claim is asserted here.
            let outcome = state
                .reconciler
                .reconcile(
                    intent_ref.intent_id,
                    None,
                    event.payload.amount,
                    &event.payload.external_txn_id,
                )
                .await?;

            Ok((StatusCode::OK, Json(Some(ReconcileResponse::from(outcome)))))
        }
        other => {
            tracing::debug!(event_type = %other, "Unhandled webhook event type");
            // Acknowledge so the gateway does not retry events we ignore.
            Ok((StatusCode::OK, Json(None)))
        }
    }
}
