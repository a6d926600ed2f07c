//! Payment intent model for gateway-mediated deposits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Intent lifecycle. `created → processed` on the first valid completion
/// signal, or `created → expired` once the TTL elapses; both transitions
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Created,
    Processed,
    Expired,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Processed => "processed",
            Self::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processed" => Self::Processed,
            "expired" => Self::Expired,
            _ => Self::Created,
        }
    }

    /// Client-facing status word (polling endpoint vocabulary).
    pub fn public_str(&self) -> &'static str {
        match self {
            Self::Created => "pending",
            Self::Processed => "completed",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A short-lived intent for a gateway deposit. The `status` column doubles
/// as the durable processed marker; `record_id` and `balance_after` memoize
/// the committed outcome for duplicate deliveries.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub intent_id: Uuid,
    pub account_id: Uuid,
    pub amount: i64,
    pub method: String,
    pub status: String,
    pub external_txn_id: Option<String>,
    pub record_id: Option<Uuid>,
    pub committed_amount: Option<i64>,
    pub balance_after: Option<i64>,
    pub created_utc: DateTime<Utc>,
    pub expires_utc: DateTime<Utc>,
    pub processed_utc: Option<DateTime<Utc>>,
}

impl PaymentIntent {
    pub fn parsed_status(&self) -> IntentStatus {
        IntentStatus::from_str(&self.status)
    }

    /// Whether the intent is past its TTL. Expiry is evaluated lazily at
    /// read time; a `created` row past TTL behaves as `expired`.
    pub fn is_past_ttl(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_utc
    }

    /// Effective status after lazy expiry.
    pub fn effective_status(&self, now: DateTime<Utc>) -> IntentStatus {
        match self.parsed_status() {
            IntentStatus::Created if self.is_past_ttl(now) => IntentStatus::Expired,
            other => other,
        }
    }
}
