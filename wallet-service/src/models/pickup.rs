use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Durable single-use marker behind a pickup token. The wire token is a
/// signed payload carrying this row's nonce; consuming flips
/// `consumed_utc` exactly once.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PickupToken {
    pub nonce: Uuid,
    pub reservation_id: i64,
    pub vehicle_id: i64,
    pub issued_utc: DateTime<Utc>,
    pub expires_utc: DateTime<Utc>,
    pub consumed_utc: Option<DateTime<Utc>>,
}

impl PickupToken {
    pub fn is_consumed(&self) -> bool {
        self.consumed_utc.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_utc
    }
}
