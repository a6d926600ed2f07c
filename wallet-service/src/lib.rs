//! Wallet & payment reconciliation service for the vehicle rental platform.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use config::Config;
use services::{
    metrics, Database, GatewayClient, IntentService, LedgerService, Notifier, PickupService,
    Reconciler, RecordStore, SettlementService,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub database: Database,
    pub ledger: LedgerService,
    pub records: RecordStore,
    pub intents: IntentService,
    pub reconciler: Reconciler,
    pub settlements: SettlementService,
    pub pickup: PickupService,
    pub gateway: GatewayClient,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self, service_core::error::AppError> {
        metrics::init_metrics();

        let database = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        database.run_migrations().await?;

        let pool = database.pool().clone();

        let notifier = Notifier::new(&config.smtp)?;
        if notifier.is_enabled() {
            tracing::info!("SMTP receipt dispatch enabled");
        } else {
            tracing::info!("SMTP receipt dispatch disabled");
        }

        let state = AppState {
            ledger: LedgerService::new(pool.clone()),
            records: RecordStore::new(pool.clone()),
            intents: IntentService::new(
                pool.clone(),
                config.payments.token_secret.clone(),
                config.payments.intent_ttl_seconds,
            ),
            reconciler: Reconciler::new(pool.clone()),
            settlements: SettlementService::new(pool.clone(), notifier),
            pickup: PickupService::new(
                pool,
                config.payments.token_secret.clone(),
                config.payments.pickup_token_ttl_seconds,
            ),
            gateway: GatewayClient::new(config.gateway.clone()),
            database,
            config: config.clone(),
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_endpoint))
            // Wallet
            .route("/wallet/deposit", post(handlers::wallet::deposit))
            .route("/wallet/withdraw", post(handlers::wallet::withdraw))
            .route("/wallet/balance", get(handlers::wallet::balance))
            .route("/wallet/transactions", get(handlers::wallet::transactions))
            .route(
                "/wallet/payments/bind-reservation",
                post(handlers::wallet::bind_reservation),
            )
            // Payment intents & reconciliation
            .route("/intents", post(handlers::intents::create_intent))
            .route(
                "/intents/:intent_id/status",
                get(handlers::intents::intent_status),
            )
            .route("/intents/confirm", post(handlers::intents::confirm_intent))
            .route("/webhooks/gateway", post(handlers::webhooks::gateway_webhook))
            // Settlements
            .route("/settlements", post(handlers::settlements::open_settlement))
            .route(
                "/settlements/:settlement_id",
                get(handlers::settlements::get_settlement),
            )
            .route(
                "/settlements/:settlement_id/wallet",
                post(handlers::settlements::settle_from_wallet),
            )
            .route(
                "/settlements/:settlement_id/cash",
                post(handlers::settlements::settle_from_cash),
            )
            .route(
                "/settlements/:settlement_id/refund",
                post(handlers::settlements::refund_settlement),
            )
            .route(
                "/reservations/:reservation_id/payments",
                get(handlers::settlements::reservation_payments),
            )
            // Pickup tokens
            .route("/pickup/tokens", post(handlers::pickup::issue_token))
            .route(
                "/pickup/tokens/consume",
                post(handlers::pickup::consume_token),
            )
            .layer(from_fn(metrics::http_metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state.clone());

        // Port 0 binds an ephemeral port for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            service_core::error::AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Wallet service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
            router,
        })
    }

    /// Port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Application state, shared with tests.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serve until the process is stopped. Also runs the periodic intent
    /// expiry sweep; reads already expire intents lazily, the sweep only
    /// tidies rows nobody asks about.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let intents = self.state.intents.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            // First tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = intents.sweep_expired().await {
                    tracing::warn!(error = %e, "Intent expiry sweep failed");
                }
            }
        });

        axum::serve(self.listener, self.router).await
    }
}
