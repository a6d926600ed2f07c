//! Pickup token endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{
    ConsumePickupTokenRequest, ConsumePickupTokenResponse, IssuePickupTokenRequest,
    IssuePickupTokenResponse,
};
use crate::middleware::StaffContext;
use crate::AppState;

/// Issue (or re-issue) the pickup token for a confirmed reservation
/// (staff only; the booking flow calls this on confirmation).
pub async fn issue_token(
    State(state): State<AppState>,
    staff: StaffContext,
    Json(payload): Json<IssuePickupTokenRequest>,
) -> Result<(StatusCode, Json<IssuePickupTokenResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        reservation_id = payload.reservation_id,
        staff_role = %staff.role,
        "Issuing pickup token"
    );

    let (token, expires_utc) = state
        .pickup
        .issue(payload.reservation_id, payload.vehicle_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(IssuePickupTokenResponse { token, expires_utc }),
    ))
}

/// Consume a scanned token exactly once (staff scanner at the station).
pub async fn consume_token(
    State(state): State<AppState>,
    _staff: StaffContext,
    Json(payload): Json<ConsumePickupTokenRequest>,
) -> Result<Json<ConsumePickupTokenResponse>, AppError> {
    payload.validate()?;

    let claims = state.pickup.consume(&payload.token).await?;

    Ok(Json(ConsumePickupTokenResponse {
        reservation_id: claims.reservation_id,
        vehicle_id: claims.vehicle_id,
    }))
}
