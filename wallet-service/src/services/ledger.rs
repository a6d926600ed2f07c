//! Wallet ledger: the authoritative balance per account.
//!
//! Every mutation happens inside a transaction, under a row lock, and in
//! the same atomic unit as the payment record that justifies it. Locks are
//! per account: concurrent operations on different accounts never contend.

use crate::models::{
    Channel, NewPaymentRecord, PaymentRecord, RecordStatus, TransactionKind, WalletAccount,
};
use crate::services::metrics::{DB_QUERY_DURATION, LEDGER_MUTATIONS_TOTAL};
use crate::services::records;
use service_core::error::AppError;
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument};
use uuid::Uuid;

/// Apply a signed delta to an account balance inside the caller's
/// transaction. Returns the new balance.
///
/// The balance row is locked before the delta is evaluated, so a negative
/// delta can never act on a stale read. For credits the row is created on
/// first use; a debit against a never-credited account fails outright.
pub(crate) async fn apply(
    conn: &mut PgConnection,
    account_id: Uuid,
    delta: i64,
) -> Result<i64, AppError> {
    if delta >= 0 {
        sqlx::query(
            "INSERT INTO wallet_accounts (account_id) VALUES ($1) ON CONFLICT (account_id) DO NOTHING",
        )
        .bind(account_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to ensure account: {}", e)))?;
    }

    let account = sqlx::query_as::<_, WalletAccount>(
        "SELECT account_id, balance, created_utc, updated_utc \
         FROM wallet_accounts WHERE account_id = $1 FOR UPDATE",
    )
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock balance: {}", e)))?;

    let current = match account {
        Some(account) => account.balance,
        // Debit against an account that has never been credited.
        None => return Err(AppError::InsufficientFunds { shortfall: -delta }),
    };

    let new_balance = current
        .checked_add(delta)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Balance overflow")))?;

    if new_balance < 0 {
        return Err(AppError::InsufficientFunds {
            shortfall: -new_balance,
        });
    }

    sqlx::query("UPDATE wallet_accounts SET balance = $2, updated_utc = now() WHERE account_id = $1")
        .bind(account_id)
        .bind(new_balance)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update balance: {}", e)))?;

    Ok(new_balance)
}

/// Public ledger operations: direct deposits, withdrawals and balance reads.
#[derive(Clone)]
pub struct LedgerService {
    pool: PgPool,
}

impl LedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current balance; zero for accounts that were never credited.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn balance(&self, account_id: Uuid) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["read_balance"])
            .start_timer();

        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM wallet_accounts WHERE account_id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to read balance: {}", e))
                })?;

        timer.observe_duration();

        Ok(balance.unwrap_or(0))
    }

    /// Credit the wallet from a directly confirmed channel (bank transfer,
    /// card capture, cash at the counter). Balance update and payment
    /// record commit together.
    #[instrument(skip(self), fields(account_id = %account_id, amount = amount, channel = %channel))]
    pub async fn deposit(
        &self,
        account_id: Uuid,
        amount: i64,
        channel: Channel,
    ) -> Result<(PaymentRecord, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["deposit"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let new_balance = apply(&mut *tx, account_id, amount).await?;

        let record = records::append(
            &mut *tx,
            NewPaymentRecord {
                account_id,
                reservation_id: None,
                settlement_id: None,
                amount,
                channel: channel.clone(),
                status: RecordStatus::Success,
                kind: TransactionKind::Deposit,
                correlation_id: None,
                note: None,
            },
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        LEDGER_MUTATIONS_TOTAL
            .with_label_values(&["deposit", "ok"])
            .inc();

        info!(
            record_id = %record.record_id,
            new_balance = new_balance,
            "Deposit applied"
        );

        Ok((record, new_balance))
    }

    /// Debit the wallet. The optional reservation id links the resulting
    /// payment record to a booking; without one the record stays unbound
    /// until the booking flow binds it.
    #[instrument(skip(self, reason), fields(account_id = %account_id, amount = amount))]
    pub async fn withdraw(
        &self,
        account_id: Uuid,
        amount: i64,
        reason: Option<String>,
        reservation_id: Option<i64>,
    ) -> Result<(PaymentRecord, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["withdraw"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let new_balance = apply(&mut *tx, account_id, -amount).await.map_err(|e| {
            if matches!(e, AppError::InsufficientFunds { .. }) {
                LEDGER_MUTATIONS_TOTAL
                    .with_label_values(&["withdraw", "insufficient_funds"])
                    .inc();
            }
            e
        })?;

        let record = records::append(
            &mut *tx,
            NewPaymentRecord {
                account_id,
                reservation_id,
                settlement_id: None,
                amount: -amount,
                channel: Channel::Wallet,
                status: RecordStatus::Success,
                kind: TransactionKind::Payment,
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
            .with_label_values(&["withdraw", "ok"])
            .inc();

        info!(
            record_id = %record.record_id,
            new_balance = new_balance,
            reservation_id = ?reservation_id,
            "Withdrawal applied"
        );

        Ok((record, new_balance))
    }
}
