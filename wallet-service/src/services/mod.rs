pub mod database;
pub mod gateway;
pub mod intents;
pub mod ledger;
pub mod metrics;
pub mod notifier;
pub mod pickup;
pub mod reconcile;
pub mod records;
pub mod settlements;

pub use database::Database;
pub use gateway::GatewayClient;
pub use intents::IntentService;
pub use ledger::LedgerService;
pub use metrics::get_metrics;
pub use notifier::Notifier;
pub use pickup::PickupService;
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use records::RecordStore;
pub use settlements::SettlementService;
