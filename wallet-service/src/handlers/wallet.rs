//! Wallet endpoints: deposits, withdrawals, balance and history.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{
    BalanceResponse, BindReservationRequest, DepositRequest, DepositResponse,
    PaymentRecordView, TransactionsResponse, WithdrawRequest, WithdrawResponse,
};
use crate::middleware::AccountContext;
use crate::models::Channel;
use crate::AppState;

/// Credit the wallet from a directly confirmed channel.
pub async fn deposit(
    State(state): State<AppState>,
    ctx: AccountContext,
    Json(payload): Json<DepositRequest>,
) -> Result<(StatusCode, Json<DepositResponse>), AppError> {
    payload.validate()?;

    let floor = state.config.payments.min_deposit;
    if payload.amount < floor {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Deposit amount {} is below the minimum of {}",
            payload.amount,
            floor
        )));
    }

    let channel = Channel::from_deposit_method(&payload.method).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Unknown deposit method '{}'",
            payload.method
        ))
    })?;

    tracing::info!(
        account_id = %ctx.account_id,
        amount = payload.amount,
        method = %payload.method,
        "Processing deposit"
    );

    let (record, balance) = state
        .ledger
        .deposit(ctx.account_id, payload.amount, channel)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DepositResponse {
            record_id: record.record_id,
            balance,
        }),
    ))
}

/// Debit the wallet, optionally against a reservation.
pub async fn withdraw(
    State(state): State<AppState>,
    ctx: AccountContext,
    Json(payload): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<WithdrawResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        account_id = %ctx.account_id,
        amount = payload.amount,
        reservation_id = ?payload.reservation_id,
        "Processing withdrawal"
    );

    let (record, balance) = state
        .ledger
        .withdraw(
            ctx.account_id,
            payload.amount,
            payload.reason,
            payload.reservation_id,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(WithdrawResponse {
            record_id: record.record_id,
            balance,
        }),
    ))
}

/// Current balance for the calling account.
pub async fn balance(
    State(state): State<AppState>,
    ctx: AccountContext,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state.ledger.balance(ctx.account_id).await?;
    Ok(Json(BalanceResponse {
        account_id: ctx.account_id,
        balance,
    }))
}

/// Transaction history for the calling account.
pub async fn transactions(
    State(state): State<AppState>,
    ctx: AccountContext,
) -> Result<Json<TransactionsResponse>, AppError> {
    let records = state.records.list_by_account(ctx.account_id).await?;
    Ok(Json(TransactionsResponse {
        records: records.into_iter().map(PaymentRecordView::from).collect(),
    }))
}

/// Bind a reservation to the caller's most recent unbound wallet payment
/// (booking flow final step).
pub async fn bind_reservation(
    State(state): State<AppState>,
    ctx: AccountContext,
    Json(payload): Json<BindReservationRequest>,
) -> Result<Json<PaymentRecordView>, AppError> {
    payload.validate()?;

    let record = state
        .records
        .find_unbound_wallet_payment(ctx.account_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "No unbound wallet payment to attach the reservation to"
            ))
        })?;

    let record = state
        .records
        .bind_reservation(record.record_id, payload.reservation_id)
        .await?;

    Ok(Json(PaymentRecordView::from(record)))
}
