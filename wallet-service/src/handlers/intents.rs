//! Payment intent endpoints: creation, polling and confirmation.
//!
//! The confirm endpoint is one of the three transports feeding the
//! reconciliation listener; the gateway webhook and staff confirmation
//! are the others. All of them end in the same idempotent call.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    ConfirmIntentRequest, CreateIntentRequest, CreateIntentResponse, IntentStatusResponse,
    ReconcileResponse,
};
use crate::middleware::AccountContext;
use crate::AppState;

/// Open a gateway deposit intent for the calling account.
pub async fn create_intent(
    State(state): State<AppState>,
    ctx: AccountContext,
    Json(payload): Json<CreateIntentRequest>,
) -> Result<(StatusCode, Json<CreateIntentResponse>), AppError> {
    payload.validate()?;

    let floor = state.config.payments.min_deposit;
    if payload.amount < floor {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Deposit amount {} is below the minimum of {}",
            payload.amount,
            floor
        )));
    }

    let (intent, intent_ref) = state
        .intents
        .create(ctx.account_id, payload.amount, &payload.method)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateIntentResponse {
            intent_id: intent.intent_id,
            intent_ref,
            amount: intent.amount,
            status: intent.parsed_status().public_str().to_string(),
            expires_utc: intent.expires_utc,
        }),
    ))
}

/// Poll target: current intent status. Polling clients stop on
/// `completed` or `expired`.
pub async fn intent_status(
    State(state): State<AppState>,
    ctx: AccountContext,
    Path(intent_id): Path<Uuid>,
) -> Result<Json<IntentStatusResponse>, AppError> {
    let intent = state
        .intents
        .find(intent_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment intent not found")))?;

    if !ctx.can_access(intent.account_id) {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Intent belongs to a different account"
        )));
    }

    let status = state.intents.status(intent_id).await?;

    Ok(Json(IntentStatusResponse {
        intent_id,
        status: status.public_str().to_string(),
    }))
}

/// Client- or staff-triggered confirmation of a gateway deposit. Safe to
/// race with the webhook and with itself; every caller receives the
/// outcome of the first committed reconciliation.
pub async fn confirm_intent(
    State(state): State<AppState>,
    ctx: AccountContext,
    Json(payload): Json<ConfirmIntentRequest>,
) -> Result<Json<ReconcileResponse>, AppError> {
    payload.validate()?;

    let intent_ref = state.intents.parse_reference(&payload.intent_ref)?;

    // Staff may confirm on behalf of any customer; customers only their own.
    let claimed_account = if ctx.is_staff() {
        None
    } else {
        Some(ctx.account_id)
    };
    if let Some(account) = claimed_account {
        if account != intent_ref.account_id {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Intent belongs to a different account"
            )));
        }
    }

    let outcome = state
        .reconciler
        .reconcile(
            intent_ref.intent_id,
            claimed_account,
            payload.amount,
            &payload.external_txn_id,
        )
        .await?;

    Ok(Json(ReconcileResponse::from(outcome)))
}
