//! Payment record store: append-mostly log of every money-movement attempt.

use crate::models::{NewPaymentRecord, PaymentRecord, RecordStatus};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument};
use uuid::Uuid;

const RECORD_COLUMNS: &str = "record_id, account_id, reservation_id, settlement_id, amount, \
                              channel, status, kind, correlation_id, note, created_utc, updated_utc";

/// Append a record inside the caller's transaction, so it commits or rolls
/// back together with the ledger mutation it justifies. A duplicate
/// correlation id means another writer already recorded this event.
pub(crate) async fn append(
    conn: &mut PgConnection,
    record: NewPaymentRecord,
) -> Result<PaymentRecord, AppError> {
    let query = format!(
        "INSERT INTO payment_records \
         (record_id, account_id, reservation_id, settlement_id, amount, channel, status, kind, correlation_id, note) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING {RECORD_COLUMNS}"
    );

    sqlx::query_as::<_, PaymentRecord>(&query)
        .bind(Uuid::new_v4())
        .bind(record.account_id)
        .bind(record.reservation_id)
        .bind(record.settlement_id)
        .bind(record.amount)
        .bind(record.channel.db_value())
        .bind(record.status.as_str())
        .bind(record.kind.as_str())
        .bind(&record.correlation_id)
        .bind(&record.note)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Payment already recorded for this correlation id or reservation"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to append payment record: {}", e)),
        })
}

/// Read-side queries and the bounded set of permitted updates.
#[derive(Clone)]
pub struct RecordStore {
    pool: PgPool,
}

impl RecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Transaction history for one account, newest first.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn list_by_account(&self, account_id: Uuid) -> Result<Vec<PaymentRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_records_by_account"])
            .start_timer();

        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records \
             WHERE account_id = $1 ORDER BY created_utc DESC LIMIT 200"
        );
        let records = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list records: {}", e)))?;

        timer.observe_duration();

        Ok(records)
    }

    /// All records linked to one reservation.
    #[instrument(skip(self))]
    pub async fn list_by_reservation(
        &self,
        reservation_id: i64,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_records_by_reservation"])
            .start_timer();

        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records \
             WHERE reservation_id = $1 ORDER BY created_utc"
        );
        let records = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(reservation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list records: {}", e)))?;

        timer.observe_duration();

        Ok(records)
    }

    /// Most recent successful wallet payment not yet bound to a
    /// reservation. The booking flow uses this to attach a reservation id
    /// to a payment made before the reservation existed.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn find_unbound_wallet_payment(
        &self,
        account_id: Uuid,
    ) -> Result<Option<PaymentRecord>, AppError> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records \
             WHERE account_id = $1 AND kind = 'payment' AND channel = 'wallet' \
               AND status = 'success' AND reservation_id IS NULL AND settlement_id IS NULL \
             ORDER BY created_utc DESC LIMIT 1"
        );
        sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to find unbound payment: {}", e))
            })
    }

    /// One-shot reservation binding. Fails `Conflict` if the record is
    /// already bound to a reservation.
    #[instrument(skip(self), fields(record_id = %record_id))]
    pub async fn bind_reservation(
        &self,
        record_id: Uuid,
        reservation_id: i64,
    ) -> Result<PaymentRecord, AppError> {
        let query = format!(
            "UPDATE payment_records SET reservation_id = $2, updated_utc = now() \
             WHERE record_id = $1 AND reservation_id IS NULL \
             RETURNING {RECORD_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(record_id)
            .bind(reservation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AppError::Conflict(anyhow::anyhow!(
                        "Reservation already has a booking payment"
                    ))
                }
                _ => AppError::DatabaseError(anyhow::anyhow!("Failed to bind reservation: {}", e)),
            })?;

        match updated {
            Some(record) => {
                info!(
                    record_id = %record.record_id,
                    reservation_id = reservation_id,
                    "Reservation bound to payment record"
                );
                Ok(record)
            }
            None => {
                if self.exists(record_id).await? {
                    Err(AppError::Conflict(anyhow::anyhow!(
                        "Payment record is already bound to a reservation"
                    )))
                } else {
                    Err(AppError::NotFound(anyhow::anyhow!("Payment record not found")))
                }
            }
        }
    }

    /// Transition a pending record to its final status, exactly once.
    #[instrument(skip(self), fields(record_id = %record_id, status = %status))]
    pub async fn mark_status(
        &self,
        record_id: Uuid,
        status: RecordStatus,
    ) -> Result<PaymentRecord, AppError> {
        if status == RecordStatus::Pending {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Records cannot transition back to pending"
            )));
        }

        let query = format!(
            "UPDATE payment_records SET status = $2, updated_utc = now() \
             WHERE record_id = $1 AND status = 'pending' \
             RETURNING {RECORD_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(record_id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update record status: {}", e))
            })?;

        match updated {
            Some(record) => Ok(record),
            None => {
                if self.exists(record_id).await? {
                    Err(AppError::Conflict(anyhow::anyhow!(
                        "Payment record status is already final"
                    )))
                } else {
                    Err(AppError::NotFound(anyhow::anyhow!("Payment record not found")))
                }
            }
        }
    }

    async fn exists(&self, record_id: Uuid) -> Result<bool, AppError> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM payment_records WHERE record_id = $1")
                .bind(record_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to check record: {}", e))
                })?;
        Ok(found.is_some())
    }
}
