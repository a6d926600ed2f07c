//! Reconciliation listener: exactly one ledger credit per payment intent.
//!
//! The same real-world gateway payment can be reported by the provider's
//! webhook, by a polling client's confirm call and by a staff member, in
//! any order and with redelivery. All of them funnel into [`Reconciler::
//! reconcile`], which serializes on the intent row: the first caller to
//! flip `created → processed` performs the credit, everyone else is
//! answered with the memoized outcome of that first commit.

use crate::models::{
    Channel, IntentStatus, NewPaymentRecord, PaymentIntent, RecordStatus, TransactionKind,
};
use crate::services::metrics::{DB_QUERY_DURATION, RECONCILE_TOTAL};
use crate::services::{ledger, records};
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use service_core::error::AppError;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const INTENT_COLUMNS: &str = "intent_id, account_id, amount, method, status, external_txn_id, \
                              record_id, committed_amount, balance_after, created_utc, \
                              expires_utc, processed_utc";

/// Result of a reconciliation call. Duplicate deliveries receive the same
/// `record_id`, `amount` and `balance` as the winning call.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub intent_id: Uuid,
    pub record_id: Uuid,
    /// Amount actually credited (the first committed amount).
    pub amount: i64,
    /// Account balance as of the winning commit.
    pub balance: i64,
    pub duplicate: bool,
}

/// Memoized committed outcome for the in-process fast path.
#[derive(Debug, Clone, Copy)]
struct CommittedOutcome {
    account_id: Uuid,
    record_id: Uuid,
    amount: i64,
    balance_after: i64,
}

#[derive(Clone)]
pub struct Reconciler {
    pool: PgPool,
    /// Non-authoritative cache of processed intents. Purely a fast path
    /// for webhook/poll convergence; the durable marker is the intent
    /// row's status column, so a restart cannot double-credit.
    outcomes: Arc<DashMap<Uuid, CommittedOutcome>>,
}

impl Reconciler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            outcomes: Arc::new(DashMap::new()),
        }
    }

    /// Apply exactly one ledger credit for `intent_id`, however many
    /// channels report it and however often.
    ///
    /// `claimed_account` carries the caller's account when the transport
    /// is client-authenticated (poll confirm); gateway webhooks are
    /// authenticated by body signature instead and pass `None`.
    #[instrument(skip(self), fields(intent_id = %intent_id, amount = reported_amount))]
    pub async fn reconcile(
        &self,
        intent_id: Uuid,
        claimed_account: Option<Uuid>,
        reported_amount: i64,
        external_txn_id: &str,
    ) -> Result<ReconcileOutcome, AppError> {
        if let Some(cached) = self.outcomes.get(&intent_id).map(|c| *c) {
            return self.replay(intent_id, claimed_account, reported_amount, cached);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["reconcile"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Serialize every channel reporting this intent on its row lock.
        let query =
            format!("SELECT {INTENT_COLUMNS} FROM payment_intents WHERE intent_id = $1 FOR UPDATE");
        let intent = sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(intent_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock intent: {}", e)))?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment intent not found")))?;

        if let Some(account) = claimed_account {
            if account != intent.account_id {
                return Err(AppError::Unauthorized(anyhow::anyhow!(
                    "Intent belongs to a different account"
                )));
            }
        }

        match intent.effective_status(Utc::now()) {
            IntentStatus::Processed => {
                // Another channel already won; hand back its outcome.
                let cached = memoized_outcome(&intent)?;
                tx.commit().await.map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
                })?;
                timer.observe_duration();
                self.outcomes.insert(intent_id, cached);
                self.replay(intent_id, None, reported_amount, cached)
            }
            IntentStatus::Expired => {
                if intent.parsed_status() == IntentStatus::Created {
                    sqlx::query(
                        "UPDATE payment_intents SET status = 'expired' WHERE intent_id = $1",
                    )
                    .bind(intent_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!("Failed to expire intent: {}", e))
                    })?;
                    tx.commit().await.map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!(
                            "Failed to commit transaction: {}",
                            e
                        ))
                    })?;
                }
                timer.observe_duration();
                RECONCILE_TOTAL.with_label_values(&["expired"]).inc();
                Err(AppError::IntentExpired)
            }
            IntentStatus::Created => {
                // This caller holds the lock on a live intent: it wins.
                // Marker flip, ledger credit and payment record are one
                // atomic unit.
                sqlx::query(
                    "UPDATE payment_intents \
                     SET status = 'processed', processed_utc = now(), external_txn_id = $2 \
                     WHERE intent_id = $1 AND status = 'created'",
                )
                .bind(intent_id)
                .bind(external_txn_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to mark intent: {}", e))
                })?;

                let balance_after =
                    ledger::apply(&mut *tx, intent.account_id, reported_amount).await?;

                let record = records::append(
                    &mut *tx,
                    NewPaymentRecord {
                        account_id: intent.account_id,
                        reservation_id: None,
                        settlement_id: None,
                        amount: reported_amount,
                        channel: Channel::Gateway(intent.method.clone()),
                        status: RecordStatus::Success,
                        kind: TransactionKind::Deposit,
                        correlation_id: Some(intent_id.to_string()),
                        note: Some(format!("gateway txn {}", external_txn_id)),
                    },
                )
                .await?;

                sqlx::query(
                    "UPDATE payment_intents \
                     SET record_id = $2, committed_amount = $3, balance_after = $4 \
                     WHERE intent_id = $1",
                )
                .bind(intent_id)
                .bind(record.record_id)
                .bind(reported_amount)
                .bind(balance_after)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to memoize outcome: {}", e))
                })?;

                tx.commit().await.map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
                })?;

                timer.observe_duration();
                RECONCILE_TOTAL.with_label_values(&["applied"]).inc();

                self.outcomes.insert(
                    intent_id,
                    CommittedOutcome {
                        account_id: intent.account_id,
                        record_id: record.record_id,
                        amount: reported_amount,
                        balance_after,
                    },
                );

                info!(
                    intent_id = %intent_id,
                    record_id = %record.record_id,
                    amount = reported_amount,
                    balance = balance_after,
                    "Reconciliation applied"
                );

                Ok(ReconcileOutcome {
                    intent_id,
                    record_id: record.record_id,
                    amount: reported_amount,
                    balance: balance_after,
                    duplicate: false,
                })
            }
        }
    }

    /// Answer a losing channel with the committed outcome. A disagreeing
    /// amount is logged and ignored: the first committed write is
    /// authoritative.
    fn replay(
        &self,
        intent_id: Uuid,
        claimed_account: Option<Uuid>,
        reported_amount: i64,
        cached: CommittedOutcome,
    ) -> Result<ReconcileOutcome, AppError> {
        if let Some(account) = claimed_account {
            if account != cached.account_id {
                return Err(AppError::Unauthorized(anyhow::anyhow!(
                    "Intent belongs to a different account"
                )));
            }
        }

        if reported_amount != cached.amount {
            warn!(
                intent_id = %intent_id,
                committed_amount = cached.amount,
                reported_amount = reported_amount,
                "Duplicate reconciliation reported a different amount; keeping first commit"
            );
        }

        RECONCILE_TOTAL.with_label_values(&["duplicate"]).inc();

        Ok(ReconcileOutcome {
            intent_id,
            record_id: cached.record_id,
            amount: cached.amount,
            balance: cached.balance_after,
            duplicate: true,
        })
    }
}

/// Extract the memoized outcome from a processed intent row.
fn memoized_outcome(intent: &PaymentIntent) -> Result<CommittedOutcome, AppError> {
    match (intent.record_id, intent.committed_amount, intent.balance_after) {
        (Some(record_id), Some(amount), Some(balance_after)) => Ok(CommittedOutcome {
            account_id: intent.account_id,
            record_id,
            amount,
            balance_after,
        }),
        _ => Err(AppError::InternalError(anyhow::anyhow!(
            "Processed intent {} has no recorded outcome",
            intent.intent_id
        ))),
    }
}
