//! Pickup token service: single-use, signed QR payloads for vehicle handover.
//!
//! Same idempotency discipline as reconciliation, at a smaller scale: the
//! durable nonce row is the marker, and consumption is an atomic flip. A
//! photographed code replayed later fails without side effect.

use crate::models::PickupToken;
use crate::services::metrics::{DB_QUERY_DURATION, PICKUP_CONSUME_TOTAL};
use crate::utils::{decode_signed, encode_signed};
use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

const TOKEN_COLUMNS: &str =
    "nonce, reservation_id, vehicle_id, issued_utc, expires_utc, consumed_utc";

/// What a successfully consumed token attests to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickupClaims {
    pub reservation_id: i64,
    pub vehicle_id: i64,
}

#[derive(Clone)]
pub struct PickupService {
    pool: PgPool,
    token_secret: Secret<String>,
    ttl_seconds: i64,
}

impl PickupService {
    pub fn new(pool: PgPool, token_secret: Secret<String>, ttl_seconds: i64) -> Self {
        Self {
            pool,
            token_secret,
            ttl_seconds,
        }
    }

    /// Issue the pickup token for a reservation. Re-issuing before the
    /// first scan replaces the nonce (invalidating older codes); after a
    /// successful scan the reservation is locked down.
    #[instrument(skip(self), fields(reservation_id = reservation_id))]
    pub async fn issue(
        &self,
        reservation_id: i64,
        vehicle_id: i64,
    ) -> Result<(String, DateTime<Utc>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["issue_pickup_token"])
            .start_timer();

        let nonce = Uuid::new_v4();
        let expires_utc = Utc::now() + Duration::seconds(self.ttl_seconds);

        let inserted: Option<Uuid> = sqlx::query_scalar(
            "INSERT INTO pickup_tokens (nonce, reservation_id, vehicle_id, expires_utc) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (reservation_id) DO UPDATE \
                 SET nonce = EXCLUDED.nonce, vehicle_id = EXCLUDED.vehicle_id, \
                     issued_utc = now(), expires_utc = EXCLUDED.expires_utc \
                 WHERE pickup_tokens.consumed_utc IS NULL \
             RETURNING nonce",
        )
        .bind(nonce)
        .bind(reservation_id)
        .bind(vehicle_id)
        .bind(expires_utc)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to issue token: {}", e)))?;

        timer.observe_duration();

        if inserted.is_none() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Pickup already confirmed for reservation {}",
                reservation_id
            )));
        }

        let token = encode_signed(
            self.token_secret.expose_secret(),
            &[
                &nonce.to_string(),
                &reservation_id.to_string(),
                &vehicle_id.to_string(),
                &expires_utc.timestamp().to_string(),
            ],
        )?;

        info!(reservation_id = reservation_id, "Pickup token issued");

        Ok((token, expires_utc))
    }

    /// Validate and consume a token exactly once. Signature, expiry and
    /// the unused nonce are all required; a rejected presentation leaves
    /// no trace in the store.
    #[instrument(skip(self, token))]
    pub async fn consume(&self, token: &str) -> Result<PickupClaims, AppError> {
        let claims = self.verify(token)?;

        if Utc::now() > claims.expires_utc {
            PICKUP_CONSUME_TOTAL.with_label_values(&["expired"]).inc();
            return Err(AppError::TokenExpired);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["consume_pickup_token"])
            .start_timer();

        let consumed = sqlx::query_as::<_, PickupToken>(&format!(
            "UPDATE pickup_tokens SET consumed_utc = now() \
             WHERE nonce = $1 AND consumed_utc IS NULL AND expires_utc > now() \
             RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(claims.nonce)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to consume token: {}", e)))?;

        timer.observe_duration();

        if let Some(row) = consumed {
            PICKUP_CONSUME_TOTAL.with_label_values(&["consumed"]).inc();
            info!(
                reservation_id = row.reservation_id,
                vehicle_id = row.vehicle_id,
                "Pickup token consumed"
            );
            return Ok(PickupClaims {
                reservation_id: row.reservation_id,
                vehicle_id: row.vehicle_id,
            });
        }

        // Flip failed: find out why for a precise rejection.
        let row = sqlx::query_as::<_, PickupToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM pickup_tokens WHERE nonce = $1"
        ))
        .bind(claims.nonce)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to inspect token: {}", e)))?;

        match row {
            Some(row) if row.is_consumed() => {
                PICKUP_CONSUME_TOTAL.with_label_values(&["replayed"]).inc();
                Err(AppError::TokenAlreadyUsed)
            }
            Some(row) if row.is_expired(Utc::now()) => {
                PICKUP_CONSUME_TOTAL.with_label_values(&["expired"]).inc();
                Err(AppError::TokenExpired)
            }
            Some(_) => {
                // Flip failed on a live, unconsumed row: raced with a
                // concurrent consumer that has not committed yet.
                PICKUP_CONSUME_TOTAL.with_label_values(&["replayed"]).inc();
                Err(AppError::TokenAlreadyUsed)
            }
            // Nonce superseded by a re-issue, or never ours.
            None => {
                PICKUP_CONSUME_TOTAL.with_label_values(&["rejected"]).inc();
                Err(AppError::NotFound(anyhow::anyhow!(
                    "Pickup token is not valid for any reservation"
                )))
            }
        }
    }

    fn verify(&self, token: &str) -> Result<VerifiedToken, AppError> {
        let fields = decode_signed(self.token_secret.expose_secret(), token)?;
        if fields.len() != 4 {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Malformed pickup token"
            )));
        }

        let nonce = Uuid::parse_str(&fields[0])
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Malformed pickup token")))?;
        let reservation_id: i64 = fields[1]
            .parse()
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Malformed pickup token")))?;
        let vehicle_id: i64 = fields[2]
            .parse()
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Malformed pickup token")))?;
        let expires_ts: i64 = fields[3]
            .parse()
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Malformed pickup token")))?;
        let expires_utc = Utc
            .timestamp_opt(expires_ts, 0)
            .single()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Malformed pickup token")))?;

        Ok(VerifiedToken {
            nonce,
            expires_utc,
        })
    }
}

struct VerifiedToken {
    nonce: Uuid,
    expires_utc: DateTime<Utc>,
}
