//! Common test utilities for wallet-service integration tests.
//!
//! Tests need a PostgreSQL instance reachable via `TEST_DATABASE_URL`;
//! when the variable is unset each test logs a skip notice and returns.

#![allow(dead_code)]

use secrecy::Secret;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Once;
use uuid::Uuid;
use wallet_service::config::{Config, DatabaseConfig, GatewayConfig, PaymentsConfig, ServerConfig,
    SmtpConfig};
use wallet_service::Application;

pub const TEST_TOKEN_SECRET: &str = "test-token-secret";
pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const TEST_MIN_DEPOSIT: i64 = 10_000;
pub const STAFF_ROLE: &str = "station_agent";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,wallet_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    /// Fresh account per test; accounts never collide across tests.
    pub account_id: Uuid,
    pub pool: PgPool,
}

impl TestApp {
    /// Spawn a test application, or `None` when no test database is
    /// configured.
    pub async fn try_spawn() -> Option<TestApp> {
        Self::try_spawn_with(|_| {}).await
    }

    /// Spawn with a config tweak (e.g. a shorter token TTL).
    pub async fn try_spawn_with(tweak: impl FnOnce(&mut Config)) -> Option<TestApp> {
        init_tracing();

        let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("skipping: TEST_DATABASE_URL not set");
            return None;
        };

        let mut config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: Secret::new(database_url.clone()),
                max_connections: 4,
                min_connections: 1,
            },
            payments: PaymentsConfig {
                min_deposit: TEST_MIN_DEPOSIT,
                intent_ttl_seconds: 900,
                pickup_token_ttl_seconds: 86_400,
                token_secret: Secret::new(TEST_TOKEN_SECRET.to_string()),
            },
            gateway: GatewayConfig {
                provider: "velopay".to_string(),
                webhook_secret: Secret::new(TEST_WEBHOOK_SECRET.to_string()),
            },
            smtp: SmtpConfig::default(),
            service_name: "wallet-service-test".to_string(),
            log_level: "debug".to_string(),
            otlp_endpoint: None,
        };
        tweak(&mut config);

        let app = Application::build(config)
            .await
            .expect("Failed to build application");
        let port = app.port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("Failed to connect test pool");

        Some(TestApp {
            address: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            account_id: Uuid::new_v4(),
            pool,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// POST as the test's customer account.
    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.post_json_as(self.account_id, path, body).await
    }

    /// POST as an arbitrary account (cross-account authorization tests).
    pub async fn post_json_as(
        &self,
        account_id: Uuid,
        path: &str,
        body: &Value,
    ) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("X-Account-ID", account_id.to_string())
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// POST with a staff role (and the test account's id).
    pub async fn staff_post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("X-Account-ID", self.account_id.to_string())
            .header("X-Staff-Role", STAFF_ROLE)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("X-Account-ID", self.account_id.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn staff_get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("X-Account-ID", self.account_id.to_string())
            .header("X-Staff-Role", STAFF_ROLE)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Deposit into the test account, asserting success.
    pub async fn deposit(&self, amount: i64, method: &str) -> Value {
        let response = self
            .post_json(
                "/wallet/deposit",
                &serde_json::json!({ "amount": amount, "method": method }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "deposit should succeed");
        response.json().await.expect("Failed to parse deposit body")
    }

    /// Current balance of the test account.
    pub async fn balance(&self) -> i64 {
        let response = self.get("/wallet/balance").await;
        assert!(response.status().is_success());
        let body: Value = response.json().await.expect("Failed to parse balance");
        body["balance"].as_i64().expect("balance should be an i64")
    }

    /// Create a gateway deposit intent; returns `(intent_id, intent_ref)`.
    pub async fn create_intent(&self, amount: i64) -> (Uuid, String) {
        let response = self
            .post_json(
                "/intents",
                &serde_json::json!({ "amount": amount, "method": "velopay" }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "intent should be created");
        let body: Value = response.json().await.expect("Failed to parse intent");
        let intent_id = body["intent_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .expect("intent_id should be a uuid");
        let intent_ref = body["intent_ref"]
            .as_str()
            .expect("intent_ref should be present")
            .to_string();
        (intent_id, intent_ref)
    }

    /// Client confirmation of a gateway deposit.
    pub async fn confirm_intent(
        &self,
        intent_ref: &str,
        amount: i64,
        external_txn_id: &str,
    ) -> reqwest::Response {
        self.post_json(
            "/intents/confirm",
            &serde_json::json!({
                "intent_ref": intent_ref,
                "amount": amount,
                "external_txn_id": external_txn_id,
            }),
        )
        .await
    }

    /// Deliver a signed `deposit.completed` webhook like the gateway would.
    pub async fn deliver_webhook(
        &self,
        intent_ref: &str,
        amount: i64,
        external_txn_id: &str,
    ) -> reqwest::Response {
        let body = serde_json::json!({
            "event": "deposit.completed",
            "payload": {
                "intent_ref": intent_ref,
                "amount": amount,
                "external_txn_id": external_txn_id,
            }
        })
        .to_string();
        let signature = service_core::utils::signature::sign(TEST_WEBHOOK_SECRET, &body)
            .expect("Failed to sign webhook body");

        self.client
            .post(self.url("/webhooks/gateway"))
            .header("X-Gateway-Signature", signature)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Force an intent's TTL into the past, as if time had moved on.
    pub async fn age_out_intent(&self, intent_id: Uuid) {
        sqlx::query(
            "UPDATE payment_intents SET expires_utc = now() - interval '1 minute' \
             WHERE intent_id = $1",
        )
        .bind(intent_id)
        .execute(&self.pool)
        .await
        .expect("Failed to age out intent");
    }
}

/// Reservation ids unique across concurrently running tests.
pub fn unique_reservation_id() -> i64 {
    (Uuid::new_v4().as_u128() & 0x7fff_ffff_ffff) as i64
}
