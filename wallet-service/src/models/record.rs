//! Payment record model: the append-mostly log of every money movement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Channel a payment moved through.
///
/// Gateway deposits carry their provider name, so the channel column is
/// free-form text with a typed view over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Wallet,
    Card,
    Cash,
    Bank,
    Gateway(String),
}

impl Channel {
    /// Database representation.
    pub fn db_value(&self) -> String {
        match self {
            Self::Wallet => "wallet".to_string(),
            Self::Card => "card".to_string(),
            Self::Cash => "cash".to_string(),
            Self::Bank => "bank".to_string(),
            Self::Gateway(provider) => format!("gateway:{}", provider),
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "wallet" => Some(Self::Wallet),
            "card" => Some(Self::Card),
            "cash" => Some(Self::Cash),
            "bank" => Some(Self::Bank),
            other => other
                .strip_prefix("gateway:")
                .filter(|p| !p.is_empty())
                .map(|p| Self::Gateway(p.to_string())),
        }
    }

    /// Parse a direct-deposit method name. Gateway deposits go through the
    /// intent flow instead and are never accepted here.
    pub fn from_deposit_method(method: &str) -> Option<Self> {
        match method {
            "bank" => Some(Self::Bank),
            "card" => Some(Self::Card),
            "cash" => Some(Self::Cash),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.db_value())
    }
}

/// Lifecycle status of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Success,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What kind of money movement a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Payment,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Payment => "payment",
            Self::Refund => "refund",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(Self::Deposit),
            "payment" => Some(Self::Payment),
            "refund" => Some(Self::Refund),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single money-movement attempt. Immutable once written except for
/// status (one transition out of `pending`) and a one-shot reservation
/// binding.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub record_id: Uuid,
    pub account_id: Uuid,
    pub reservation_id: Option<i64>,
    pub settlement_id: Option<Uuid>,
    /// Signed minor units: positive = credit to the wallet, negative = debit.
    pub amount: i64,
    pub channel: String,
    pub status: String,
    pub kind: String,
    pub correlation_id: Option<String>,
    pub note: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn parsed_channel(&self) -> Option<Channel> {
        Channel::from_str(&self.channel)
    }

    pub fn parsed_status(&self) -> RecordStatus {
        RecordStatus::from_str(&self.status)
    }

    pub fn parsed_kind(&self) -> Option<TransactionKind> {
        TransactionKind::from_str(&self.kind)
    }
}

/// Input for appending a new payment record.
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub account_id: Uuid,
    pub reservation_id: Option<i64>,
    pub settlement_id: Option<Uuid>,
    pub amount: i64,
    pub channel: Channel,
    pub status: RecordStatus,
    pub kind: TransactionKind,
    pub correlation_id: Option<String>,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_db_value_roundtrip() {
        for channel in [
            Channel::Wallet,
            Channel::Card,
            Channel::Cash,
            Channel::Bank,
            Channel::Gateway("velopay".to_string()),
        ] {
            let db = channel.db_value();
            assert_eq!(Channel::from_str(&db), Some(channel));
        }
    }

    #[test]
    fn channel_rejects_unknown_values() {
        assert_eq!(Channel::from_str("paypal"), None);
        assert_eq!(Channel::from_str("gateway:"), None);
        assert_eq!(Channel::from_str(""), None);
    }

    #[test]
    fn deposit_method_excludes_wallet_and_gateway() {
        assert_eq!(Channel::from_deposit_method("bank"), Some(Channel::Bank));
        assert_eq!(Channel::from_deposit_method("card"), Some(Channel::Card));
        assert_eq!(Channel::from_deposit_method("cash"), Some(Channel::Cash));
        assert_eq!(Channel::from_deposit_method("wallet"), None);
        assert_eq!(Channel::from_deposit_method("gateway:velopay"), None);
    }
}
