//! Settlement endpoints for vehicle return processing.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    OpenSettlementRequest, PaymentRecordView, RefundRequest, SettlePaymentResponse,
    SettleRequest, SettlementView, TransactionsResponse,
};
use crate::middleware::{AccountContext, StaffContext};
use crate::models::ReturnTiming;
use crate::services::settlements::OpenSettlement;
use crate::AppState;

/// Open the charge for a returned rental (staff only).
pub async fn open_settlement(
    State(state): State<AppState>,
    staff: StaffContext,
    Json(payload): Json<OpenSettlementRequest>,
) -> Result<(StatusCode, Json<SettlementView>), AppError> {
    payload.validate()?;

    let timing = ReturnTiming::classify(payload.scheduled_end_utc, payload.returned_at_utc);

    tracing::info!(
        reservation_id = payload.reservation_id,
        staff_role = %staff.role,
        timing = %timing,
        "Opening settlement"
    );

    let settlement = state
        .settlements
        .open(OpenSettlement {
            reservation_id: payload.reservation_id,
            account_id: payload.account_id,
            base_fare: payload.base_fare,
            late_fee: payload.late_fee,
            damage_fee: payload.damage_fee,
            timing,
            receipt_email: payload.receipt_email,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(SettlementView::from(settlement))))
}

/// Settlement details, visible to the owning customer and to staff.
pub async fn get_settlement(
    State(state): State<AppState>,
    ctx: AccountContext,
    Path(settlement_id): Path<Uuid>,
) -> Result<Json<SettlementView>, AppError> {
    let settlement = state.settlements.get(settlement_id).await?;

    if !ctx.can_access(settlement.account_id) {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Settlement belongs to a different account"
        )));
    }

    Ok(Json(SettlementView::from(settlement)))
}

/// Pay part of a settlement from the customer's wallet.
pub async fn settle_from_wallet(
    State(state): State<AppState>,
    ctx: AccountContext,
    Path(settlement_id): Path<Uuid>,
    Json(payload): Json<SettleRequest>,
) -> Result<Json<SettlePaymentResponse>, AppError> {
    payload.validate()?;

    let settlement = state.settlements.get(settlement_id).await?;
    if !ctx.can_access(settlement.account_id) {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Settlement belongs to a different account"
        )));
    }

    let (settlement, record, balance) = state
        .settlements
        .settle_from_wallet(settlement_id, payload.amount)
        .await?;

    Ok(Json(SettlePaymentResponse {
        settlement: SettlementView::from(settlement),
        record_id: record.record_id,
        balance: Some(balance),
    }))
}

/// Record a cash payment confirmed at the counter (staff only).
pub async fn settle_from_cash(
    State(state): State<AppState>,
    staff: StaffContext,
    Path(settlement_id): Path<Uuid>,
    Json(payload): Json<SettleRequest>,
) -> Result<Json<SettlePaymentResponse>, AppError> {
    payload.validate()?;

    tracing::info!(
        settlement_id = %settlement_id,
        staff_role = %staff.role,
        amount = payload.amount,
        "Recording cash settlement"
    );

    let (settlement, record) = state
        .settlements
        .settle_from_cash(settlement_id, payload.amount)
        .await?;

    Ok(Json(SettlePaymentResponse {
        settlement: SettlementView::from(settlement),
        record_id: record.record_id,
        balance: None,
    }))
}

/// Compensating refund for a disputed fee (staff only). Valid on closed
/// settlements; the settlement itself stays immutable.
pub async fn refund_settlement(
    State(state): State<AppState>,
    staff: StaffContext,
    Path(settlement_id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> Result<Json<SettlePaymentResponse>, AppError> {
    payload.validate()?;

    tracing::info!(
        settlement_id = %settlement_id,
        staff_role = %staff.role,
        amount = payload.amount,
        "Applying compensating refund"
    );

    let (settlement, record, balance) = state
        .settlements
        .refund(settlement_id, payload.amount, payload.reason)
        .await?;

    Ok(Json(SettlePaymentResponse {
        settlement: SettlementView::from(settlement),
        record_id: record.record_id,
        balance: Some(balance),
    }))
}

/// All payment records linked to a reservation (staff only).
pub async fn reservation_payments(
    State(state): State<AppState>,
    _staff: StaffContext,
    Path(reservation_id): Path<i64>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let records = state.records.list_by_reservation(reservation_id).await?;
    Ok(Json(TransactionsResponse {
        records: records.into_iter().map(PaymentRecordView::from).collect(),
    }))
}
