//! Settlement engine: end-of-rental charge computation and collection.

use crate::models::{
    Channel, NewPaymentRecord, PaymentRecord, RecordStatus, ReturnTiming, Settlement,
    TransactionKind,
};
use crate::services::metrics::{DB_QUERY_DURATION, LEDGER_MUTATIONS_TOTAL,
    SETTLEMENTS_CLOSED_TOTAL};
use crate::services::notifier::Notifier;
use crate::services::{ledger, records};
use service_core::error::AppError;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument, warn};
use uuid::Uuid;

const SETTLEMENT_COLUMNS: &str = "settlement_id, reservation_id, account_id, base_fare, late_fee, \
                                  damage_fee, total_due, remaining_due, timing, receipt_email, \
                                  created_utc, closed_utc";

/// Input for opening a settlement at vehicle return.
#[derive(Debug, Clone)]
pub struct OpenSettlement {
    pub reservation_id: i64,
    pub account_id: Uuid,
    pub base_fare: i64,
    pub late_fee: i64,
    pub damage_fee: i64,
    pub timing: ReturnTiming,
    pub receipt_email: Option<String>,
}

#[derive(Clone)]
pub struct SettlementService {
    pool: PgPool,
    notifier: Notifier,
}

impl SettlementService {
    pub fn new(pool: PgPool, notifier: Notifier) -> Self {
        Self { pool, notifier }
    }

    /// Open the charge for a returned rental. One settlement per
    /// reservation; the fee components are frozen at this point.
    #[instrument(skip(self, input), fields(reservation_id = input.reservation_id))]
    pub async fn open(&self, input: OpenSettlement) -> Result<Settlement, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_settlement"])
            .start_timer();

        let total_due = crate::models::settlement::compute_total_due(
            input.base_fare,
            input.late_fee,
            input.damage_fee,
        )
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Fee total overflows")))?;

        let query = format!(
            "INSERT INTO settlements \
             (settlement_id, reservation_id, account_id, base_fare, late_fee, damage_fee, \
              total_due, remaining_due, timing, receipt_email, closed_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8, $9, CASE WHEN $7 = 0 THEN now() END) \
             RETURNING {SETTLEMENT_COLUMNS}"
        );
        let settlement = sqlx::query_as::<_, Settlement>(&query)
            .bind(Uuid::new_v4())
            .bind(input.reservation_id)
            .bind(input.account_id)
            .bind(input.base_fare)
            .bind(input.late_fee)
            .bind(input.damage_fee)
            .bind(total_due)
            .bind(input.timing.as_str())
            .bind(&input.receipt_email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AppError::Conflict(anyhow::anyhow!(
                        "Settlement already exists for reservation {}",
                        input.reservation_id
                    ))
                }
                _ => AppError::DatabaseError(anyhow::anyhow!("Failed to open settlement: {}", e)),
            })?;

        timer.observe_duration();

        info!(
            settlement_id = %settlement.settlement_id,
            total_due = settlement.total_due,
            timing = %settlement.timing,
            "Settlement opened"
        );

        Ok(settlement)
    }

    #[instrument(skip(self), fields(settlement_id = %settlement_id))]
    pub async fn get(&self, settlement_id: Uuid) -> Result<Settlement, AppError> {
        let query = format!("SELECT {SETTLEMENT_COLUMNS} FROM settlements WHERE settlement_id = $1");
        sqlx::query_as::<_, Settlement>(&query)
            .bind(settlement_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to fetch settlement: {}", e))
            })?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Settlement not found")))
    }

    /// Pay part (or all) of a settlement from the customer's wallet.
    /// Ledger debit, payment record and `remaining_due` update commit as
    /// one atomic unit; `InsufficientFunds` leaves everything untouched.
    #[instrument(skip(self), fields(settlement_id = %settlement_id, amount = amount))]
    pub async fn settle_from_wallet(
        &self,
        settlement_id: Uuid,
        amount: i64,
    ) -> Result<(Settlement, PaymentRecord, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle_from_wallet"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let settlement = lock_open_settlement(&mut tx, settlement_id, amount).await?;

        let new_balance = ledger::apply(&mut *tx, settlement.account_id, -amount)
            .await
            .map_err(|e| {
                if matches!(e, AppError::InsufficientFunds { .. }) {
                    LEDGER_MUTATIONS_TOTAL
                        .with_label_values(&["settle", "insufficient_funds"])
                        .inc();
                }
                e
            })?;

        let record = records::append(
            &mut *tx,
            NewPaymentRecord {
                account_id: settlement.account_id,
                reservation_id: Some(settlement.reservation_id),
                settlement_id: Some(settlement.settlement_id),
                amount: -amount,
                channel: Channel::Wallet,
                status: RecordStatus::Success,
                kind: TransactionKind::Payment,
                correlation_id: None,
                note: None,
            },
        )
        .await?;

        let settlement = decrement_remaining(&mut tx, settlement_id, amount).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        LEDGER_MUTATIONS_TOTAL
            .with_label_values(&["settle", "ok"])
            .inc();

        info!(
            settlement_id = %settlement_id,
            record_id = %record.record_id,
            remaining_due = settlement.remaining_due,
            "Wallet settlement applied"
        );

        self.after_settlement(&settlement);

        Ok((settlement, record, new_balance))
    }

    /// Record a cash payment confirmed by staff out-of-band. Reduces
    /// `remaining_due` without touching the wallet ledger.
    #[instrument(skip(self), fields(settlement_id = %settlement_id, amount = amount))]
    pub async fn settle_from_cash(
        &self,
        settlement_id: Uuid,
        amount: i64,
    ) -> Result<(Settlement, PaymentRecord), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle_from_cash"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let settlement = lock_open_settlement(&mut tx, settlement_id, amount).await?;

        let record = records::append(
            &mut *tx,
            NewPaymentRecord {
                account_id: settlement.account_id,
                reservation_id: Some(settlement.reservation_id),
                settlement_id: Some(settlement.settlement_id),
                amount: -amount,
                channel: Channel::Cash,
                status: RecordStatus::Success,
                kind: TransactionKind::Payment,
                correlation_id: None,
                note: None,
            },
        )
        .await?;

        let settlement = decrement_remaining(&mut tx, settlement_id, amount).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            settlement_id = %settlement_id,
            record_id = %record.record_id,
            remaining_due = settlement.remaining_due,
            "Cash settlement recorded"
        );

        self.after_settlement(&settlement);

        Ok((settlement, record))
    }

    /// Compensating refund for a disputed late/damage fee. The settlement
    /// row never changes once opened; the correction credits the wallet
    /// through an explicit refund record, and is valid after closure.
    #[instrument(skip(self, reason), fields(settlement_id = %settlement_id, amount = amount))]
    pub async fn refund(
        &self,
        settlement_id: Uuid,
        amount: i64,
        reason: Option<String>,
    ) -> Result<(Settlement, PaymentRecord, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["refund_settlement"])
            .start_timer();

        if amount <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Refund amount must be positive"
            )));
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let query = format!(
            "SELECT {SETTLEMENT_COLUMNS} FROM settlements WHERE settlement_id = $1 FOR UPDATE"
        );
        let settlement = sqlx::query_as::<_, Settlement>(&query)
            .bind(settlement_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to lock settlement: {}", e))
            })?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Settlement not found")))?;

        // Never hand back more than was actually collected.
        let refunded: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payment_records \
             WHERE settlement_id = $1 AND kind = 'refund' AND status = 'success'",
        )
        .bind(settlement_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum refunds: {}", e)))?;

        if amount + refunded > settlement.settled() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Refund of {} exceeds the {} still refundable",
                amount,
                settlement.settled() - refunded
            )));
        }

        let new_balance = ledger::apply(&mut *tx, settlement.account_id, amount).await?;

        let record = records::append(
            &mut *tx,
            NewPaymentRecord {
                account_id: settlement.account_id,
                reservation_id: Some(settlement.reservation_id),
                settlement_id: Some(settlement.settlement_id),
                amount,
                channel: Channel::Wallet,
                status: RecordStatus::Success,
                kind: TransactionKind::Refund,
                correlation_id: None,
                note: reason,
            },
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        LEDGER_MUTATIONS_TOTAL
            .with_label_values(&["refund", "ok"])
            .inc();

        info!(
            settlement_id = %settlement_id,
            record_id = %record.record_id,
            amount = amount,
            "Compensating refund applied"
        );

        Ok((settlement, record, new_balance))
    }

    /// Post-commit side effects once a settlement closes. The receipt is
    /// fire-and-forget: a delivery failure never affects the committed
    /// financial state.
    fn after_settlement(&self, settlement: &Settlement) {
        if !settlement.is_closed() {
            return;
        }

        SETTLEMENTS_CLOSED_TOTAL.inc();

        let notifier = self.notifier.clone();
        let settlement = settlement.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_settlement_receipt(&settlement).await {
                warn!(
                    settlement_id = %settlement.settlement_id,
                    error = %e,
                    "Failed to send settlement receipt"
                );
            }
        });
    }
}

/// Lock the settlement row and validate the payment amount against it.
async fn lock_open_settlement(
    tx: &mut Transaction<'_, Postgres>,
    settlement_id: Uuid,
    amount: i64,
) -> Result<Settlement, AppError> {
    let query =
        format!("SELECT {SETTLEMENT_COLUMNS} FROM settlements WHERE settlement_id = $1 FOR UPDATE");
    let settlement = sqlx::query_as::<_, Settlement>(&query)
        .bind(settlement_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock settlement: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Settlement not found")))?;

    if settlement.is_closed() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Settlement is closed and immutable"
        )));
    }
    if amount <= 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Settlement amount must be positive"
        )));
    }
    if amount > settlement.remaining_due {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Amount {} exceeds remaining due {}",
            amount,
            settlement.remaining_due
        )));
    }

    Ok(settlement)
}

/// Reduce `remaining_due`, closing the settlement at exactly zero.
async fn decrement_remaining(
    tx: &mut Transaction<'_, Postgres>,
    settlement_id: Uuid,
    amount: i64,
) -> Result<Settlement, AppError> {
    let query = format!(
        "UPDATE settlements \
         SET remaining_due = remaining_due - $2, \
             closed_utc = CASE WHEN remaining_due - $2 = 0 THEN now() END \
         WHERE settlement_id = $1 \
         RETURNING {SETTLEMENT_COLUMNS}"
    );
    sqlx::query_as::<_, Settlement>(&query)
        .bind(settlement_id)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update remaining due: {}", e))
        })
}
