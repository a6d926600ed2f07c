use secrecy::Secret;
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Knobs of the wallet engine itself.
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    /// Deposits below this floor (minor units) are rejected up front.
    #[serde(default = "default_min_deposit")]
    pub min_deposit: i64,
    /// How long a gateway deposit intent stays redeemable.
    #[serde(default = "default_intent_ttl")]
    pub intent_ttl_seconds: i64,
    /// How long an issued pickup token stays scannable.
    #[serde(default = "default_pickup_token_ttl")]
    pub pickup_token_ttl_seconds: i64,
    /// Secret for signing intent references and pickup tokens.
    #[serde(default = "default_token_secret")]
    pub token_secret: Secret<String>,
}

/// Third-party wallet gateway integration.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_provider")]
    pub provider: String,
    /// Shared secret for webhook body signatures.
    #[serde(default = "default_token_secret")]
    pub webhook_secret: Secret<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_empty_secret")]
    pub password: Secret<String>,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Config {
    /// Load configuration from `configuration.*` (optional) and
    /// `WALLET_`-prefixed environment variables (e.g. `WALLET_DATABASE__URL`).
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("WALLET").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            min_deposit: default_min_deposit(),
            intent_ttl_seconds: default_intent_ttl(),
            pickup_token_ttl_seconds: default_pickup_token_ttl(),
            token_secret: default_token_secret(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: default_gateway_provider(),
            webhook_secret: default_token_secret(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: Secret::new(String::new()),
            from_email: default_from_email(),
            from_name: default_from_name(),
        }
    }
}

fn default_service_name() -> String {
    "wallet-service".to_string()
}

fn default_log_level() -> String {
    "info,wallet_service=debug".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8084
}

fn default_max_connections() -> u32 {
    16
}

fn default_min_connections() -> u32 {
    1
}

fn default_min_deposit() -> i64 {
    10_000
}

fn default_intent_ttl() -> i64 {
    900
}

fn default_pickup_token_ttl() -> i64 {
    86_400
}

fn default_token_secret() -> Secret<String> {
    Secret::new("dev-secret".to_string())
}

fn default_empty_secret() -> Secret<String> {
    Secret::new(String::new())
}

fn default_gateway_provider() -> String {
    "velopay".to_string()
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_email() -> String {
    "no-reply@rental.example".to_string()
}

fn default_from_name() -> String {
    "Rental Wallet".to_string()
}
