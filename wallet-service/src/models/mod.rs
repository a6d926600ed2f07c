//! Domain models for wallet-service.

pub mod intent;
pub mod pickup;
pub mod record;
pub mod settlement;
pub mod wallet;

pub use intent::{IntentStatus, PaymentIntent};
pub use pickup::PickupToken;
pub use record::{Channel, NewPaymentRecord, PaymentRecord, RecordStatus, TransactionKind};
pub use settlement::{ReturnTiming, Settlement};
pub use wallet::WalletAccount;
