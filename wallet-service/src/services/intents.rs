//! Payment intent manager for gateway-mediated deposits.
//!
//! An intent's wire reference is a signed token binding the intent to its
//! owning account, so a caller cannot claim someone else's deposit by
//! constructing a similar-looking id. The database row is the durable
//! state machine; expiry is evaluated lazily at read time.

use crate::models::{IntentStatus, PaymentIntent};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::utils::{decode_signed, encode_signed};
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use sqlx::PgPool;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const INTENT_COLUMNS: &str = "intent_id, account_id, amount, method, status, external_txn_id, \
                              record_id, committed_amount, balance_after, created_utc, \
                              expires_utc, processed_utc";

/// Verified claims recovered from an intent reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentRef {
    pub intent_id: Uuid,
    pub account_id: Uuid,
}

#[derive(Clone)]
pub struct IntentService {
    pool: PgPool,
    token_secret: Secret<String>,
    ttl_seconds: i64,
}

impl IntentService {
    pub fn new(pool: PgPool, token_secret: Secret<String>, ttl_seconds: i64) -> Self {
        Self {
            pool,
            token_secret,
            ttl_seconds,
        }
    }

    /// Open a new intent and return it with its signed wire reference.
    #[instrument(skip(self), fields(account_id = %account_id, amount = amount, method = %method))]
    pub async fn create(
        &self,
        account_id: Uuid,
        amount: i64,
        method: &str,
    ) -> Result<(PaymentIntent, String), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_intent"])
            .start_timer();

        let expires_utc = Utc::now() + Duration::seconds(self.ttl_seconds);
        let query = format!(
            "INSERT INTO payment_intents (intent_id, account_id, amount, method, expires_utc) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {INTENT_COLUMNS}"
        );
        let intent = sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(Uuid::new_v4())
            .bind(account_id)
            .bind(amount)
            .bind(method)
            .bind(expires_utc)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create intent: {}", e))
            })?;

        timer.observe_duration();

        let reference = self.reference_for(&intent)?;

        info!(
            intent_id = %intent.intent_id,
            expires_utc = %intent.expires_utc,
            "Payment intent created"
        );

        Ok((intent, reference))
    }

    /// Signed reference for an intent: the only form ever handed to the
    /// gateway or the client.
    pub fn reference_for(&self, intent: &PaymentIntent) -> Result<String, AppError> {
        encode_signed(
            self.token_secret.expose_secret(),
            &[
                &intent.intent_id.to_string(),
                &intent.account_id.to_string(),
                &intent.expires_utc.timestamp().to_string(),
            ],
        )
    }

    /// Verify a signed reference and recover the intent's identity and
    /// owner. Tampered or malformed references fail `Unauthorized`.
    pub fn parse_reference(&self, reference: &str) -> Result<IntentRef, AppError> {
        let fields = decode_signed(self.token_secret.expose_secret(), reference)?;
        if fields.len() != 3 {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Malformed intent reference"
            )));
        }

        let intent_id = Uuid::parse_str(&fields[0])
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Malformed intent reference")))?;
        let account_id = Uuid::parse_str(&fields[1])
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Malformed intent reference")))?;

        Ok(IntentRef {
            intent_id,
            account_id,
        })
    }

    pub async fn find(&self, intent_id: Uuid) -> Result<Option<PaymentIntent>, AppError> {
        let query = format!("SELECT {INTENT_COLUMNS} FROM payment_intents WHERE intent_id = $1");
        sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(intent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch intent: {}", e)))
    }

    /// Current status with lazy expiry: a `created` intent past TTL is
    /// flipped to `expired` on first observation.
    #[instrument(skip(self), fields(intent_id = %intent_id))]
    pub async fn status(&self, intent_id: Uuid) -> Result<IntentStatus, AppError> {
        let intent = self
            .find(intent_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment intent not found")))?;

        let effective = intent.effective_status(Utc::now());
        if effective == IntentStatus::Expired && intent.parsed_status() == IntentStatus::Created {
            self.flip_expired(intent_id).await?;
        }

        Ok(effective)
    }

    /// Terminal-state the row; only ever valid from `created`.
    pub(crate) async fn flip_expired(&self, intent_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE payment_intents SET status = 'expired' \
             WHERE intent_id = $1 AND status = 'created'",
        )
        .bind(intent_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to expire intent: {}", e)))?;

        if result.rows_affected() > 0 {
            debug!(intent_id = %intent_id, "Intent lazily expired");
        }
        Ok(())
    }

    /// Hygiene sweep for intents whose TTL elapsed without any read
    /// observing them. Correctness never depends on this running.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE payment_intents SET status = 'expired' \
             WHERE status = 'created' AND expires_utc < now()",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sweep intents: {}", e)))?;

        let swept = result.rows_affected();
        if swept > 0 {
            info!(swept = swept, "Expired stale payment intents");
        }
        Ok(swept)
    }
}
