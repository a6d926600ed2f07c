use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Wallet balance row. One per customer account, created lazily on first
/// credit. Only ever mutated under a row lock together with the payment
/// record that justifies the change.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletAccount {
    pub account_id: Uuid,
    /// Integer minor currency units.
    pub balance: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}
