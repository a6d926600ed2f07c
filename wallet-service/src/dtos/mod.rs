//! Request and response types for the HTTP surface.
//!
//! Every operation has an explicit tagged shape; validation runs once at
//! the boundary before any store access.

use crate::models::{PaymentRecord, Settlement};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// -------------------------------------------------------------------------
// Wallet
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct DepositRequest {
    /// Minor currency units. The configured deposit floor is enforced in
    /// the handler on top of this basic sanity check.
    #[validate(range(min = 1))]
    pub amount: i64,
    /// One of `bank`, `card`, `cash`. Gateway deposits use the intent flow.
    #[validate(length(min = 1, max = 32))]
    pub method: String,
}

#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub record_id: Uuid,
    pub balance: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct WithdrawRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(max = 256))]
    pub reason: Option<String>,
    pub reservation_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub record_id: Uuid,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub balance: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BindReservationRequest {
    pub reservation_id: i64,
}

// -------------------------------------------------------------------------
// Payment records
// -------------------------------------------------------------------------

/// Payment record as exposed to clients.
#[derive(Debug, Serialize)]
pub struct PaymentRecordView {
    pub record_id: Uuid,
    pub reservation_id: Option<i64>,
    pub settlement_id: Option<Uuid>,
    pub amount: i64,
    pub channel: String,
    pub status: String,
    pub kind: String,
    pub note: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<PaymentRecord> for PaymentRecordView {
    fn from(r: PaymentRecord) -> Self {
        Self {
            record_id: r.record_id,
            reservation_id: r.reservation_id,
            settlement_id: r.settlement_id,
            amount: r.amount,
            channel: r.channel,
            status: r.status,
            kind: r.kind,
            note: r.note,
            created_utc: r.created_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub records: Vec<PaymentRecordView>,
}

// -------------------------------------------------------------------------
// Payment intents & reconciliation
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateIntentRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    /// Gateway method/provider, e.g. `velopay`.
    #[validate(length(min = 1, max = 32))]
    pub method: String,
}

#[derive(Debug, Serialize)]
pub struct CreateIntentResponse {
    pub intent_id: Uuid,
    /// Signed reference to hand to the gateway and poll with.
    pub intent_ref: String,
    pub amount: i64,
    pub status: String,
    pub expires_utc: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct IntentStatusResponse {
    pub intent_id: Uuid,
    /// `pending`, `completed` or `expired`.
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmIntentRequest {
    #[validate(length(min = 1, max = 512))]
    pub intent_ref: String,
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(min = 1, max = 128))]
    pub external_txn_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub intent_id: Uuid,
    pub record_id: Uuid,
    pub amount: i64,
    pub balance: i64,
    pub duplicate: bool,
}

impl From<crate::services::ReconcileOutcome> for ReconcileResponse {
    fn from(o: crate::services::ReconcileOutcome) -> Self {
        Self {
            intent_id: o.intent_id,
            record_id: o.record_id,
            amount: o.amount,
            balance: o.balance,
            duplicate: o.duplicate,
        }
    }
}

// -------------------------------------------------------------------------
// Settlements
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct OpenSettlementRequest {
    pub reservation_id: i64,
    pub account_id: Uuid,
    #[validate(range(min = 0))]
    pub base_fare: i64,
    #[validate(range(min = 0))]
    pub late_fee: i64,
    #[validate(range(min = 0))]
    pub damage_fee: i64,
    /// Scheduled end of the rental, used to classify the handover.
    pub scheduled_end_utc: DateTime<Utc>,
    /// When the vehicle actually came back.
    pub returned_at_utc: DateTime<Utc>,
    #[validate(email)]
    pub receipt_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SettleRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(max = 256))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SettlementView {
    pub settlement_id: Uuid,
    pub reservation_id: i64,
    pub account_id: Uuid,
    pub base_fare: i64,
    pub late_fee: i64,
    pub damage_fee: i64,
    pub total_due: i64,
    pub remaining_due: i64,
    pub settled: i64,
    pub timing: String,
    pub closed: bool,
}

impl From<Settlement> for SettlementView {
    fn from(s: Settlement) -> Self {
        Self {
            settlement_id: s.settlement_id,
            reservation_id: s.reservation_id,
            account_id: s.account_id,
            base_fare: s.base_fare,
            late_fee: s.late_fee,
            damage_fee: s.damage_fee,
            total_due: s.total_due,
            settled: s.settled(),
            remaining_due: s.remaining_due,
            timing: s.timing,
            closed: s.closed_utc.is_some(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SettlePaymentResponse {
    pub settlement: SettlementView,
    pub record_id: Uuid,
    /// Wallet balance after the debit; absent for cash payments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

// -------------------------------------------------------------------------
// Pickup tokens
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct IssuePickupTokenRequest {
    pub reservation_id: i64,
    pub vehicle_id: i64,
}

#[derive(Debug, Serialize)]
pub struct IssuePickupTokenResponse {
    /// Signed QR payload.
    pub token: String,
    pub expires_utc: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConsumePickupTokenRequest {
    #[validate(length(min = 1, max = 1024))]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ConsumePickupTokenResponse {
    pub reservation_id: i64,
    pub vehicle_id: i64,
}
