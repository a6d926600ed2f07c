//! Settlement model: the end-of-rental charge and its payment progress.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Grace window (minutes) around the scheduled return before a handover
/// counts as early or late.
const RETURN_GRACE_MINUTES: i64 = 5;

/// Classification of the vehicle handover relative to schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnTiming {
    Early,
    OnTime,
    Late,
}

impl ReturnTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::OnTime => "on_time",
            Self::Late => "late",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "early" => Self::Early,
            "late" => Self::Late,
            _ => Self::OnTime,
        }
    }

    /// Classify an actual return against the scheduled end of the rental.
    pub fn classify(scheduled_end: DateTime<Utc>, returned_at: DateTime<Utc>) -> Self {
        let grace = Duration::minutes(RETURN_GRACE_MINUTES);
        if returned_at < scheduled_end - grace {
            Self::Early
        } else if returned_at <= scheduled_end + grace {
            Self::OnTime
        } else {
            Self::Late
        }
    }
}

impl std::fmt::Display for ReturnTiming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Charge opened at vehicle return. `remaining_due` only ever decreases,
/// and the row becomes immutable once it reaches zero (`closed_utc` set).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Settlement {
    pub settlement_id: Uuid,
    pub reservation_id: i64,
    pub account_id: Uuid,
    pub base_fare: i64,
    pub late_fee: i64,
    pub damage_fee: i64,
    pub total_due: i64,
    pub remaining_due: i64,
    pub timing: String,
    pub receipt_email: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub closed_utc: Option<DateTime<Utc>>,
}

impl Settlement {
    pub fn parsed_timing(&self) -> ReturnTiming {
        ReturnTiming::from_str(&self.timing)
    }

    pub fn is_closed(&self) -> bool {
        self.closed_utc.is_some()
    }

    /// Amount already collected through successful payments.
    pub fn settled(&self) -> i64 {
        self.total_due - self.remaining_due
    }
}

/// Sum the fee components, rejecting overflow.
pub fn compute_total_due(base_fare: i64, late_fee: i64, damage_fee: i64) -> Option<i64> {
    base_fare.checked_add(late_fee)?.checked_add(damage_fee)
}
