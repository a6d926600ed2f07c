use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Authentication error: {0}")]
    AuthError(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Insufficient funds: short by {shortfall} minor units")]
    InsufficientFunds { shortfall: i64 },

    #[error("Payment intent has expired")]
    IntentExpired,

    #[error("Pickup token has expired")]
    TokenExpired,

    #[error("Pickup token was already used")]
    TokenAlreadyUsed,

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<lettre::error::Error> for AppError {
    fn from(err: lettre::error::Error) -> Self {
        AppError::EmailError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

/// Response-extension marker carrying the error kind, so middleware can
/// count failures without re-parsing bodies.
#[derive(Debug, Clone, Copy)]
pub struct ErrorKind(pub &'static str);

impl AppError {
    /// Stable label for the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::AuthError(_) => "auth",
            AppError::Conflict(_) => "conflict",
            AppError::InsufficientFunds { .. } => "insufficient_funds",
            AppError::IntentExpired => "intent_expired",
            AppError::TokenExpired => "token_expired",
            AppError::TokenAlreadyUsed => "token_already_used",
            AppError::InternalError(_) => "internal",
            AppError::DatabaseError(_) => "database",
            AppError::EmailError(_) => "email",
            AppError::ConfigError(_) => "config",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            shortfall: Option<i64>,
        }

        let kind = self.kind();
        let (status, error_message, details, shortfall) = match self {
            AppError::ValidationError(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None, None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None, None),
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None, None),
            AppError::Forbidden(err) => (StatusCode::FORBIDDEN, err.to_string(), None, None),
            AppError::AuthError(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None, None),
            AppError::Conflict(err) => (StatusCode::CONFLICT, err.to_string(), None, None),
            AppError::InsufficientFunds { shortfall } => (
                StatusCode::PAYMENT_REQUIRED,
                "Insufficient funds".to_string(),
                None,
                Some(shortfall),
            ),
            AppError::IntentExpired => (
                StatusCode::GONE,
                "Payment intent has expired".to_string(),
                None,
                None,
            ),
            AppError::TokenExpired => (
                StatusCode::GONE,
                "Pickup token has expired".to_string(),
                None,
                None,
            ),
            AppError::TokenAlreadyUsed => (
                StatusCode::CONFLICT,
                "Pickup token was already used".to_string(),
                None,
                None,
            ),
            AppError::InternalError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(format!("{:#?}", err)),
                None,
            ),
            AppError::DatabaseError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::EmailError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Email error".to_string(),
                Some(msg),
                None,
            ),
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
                None,
            ),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
                shortfall,
            }),
        )
            .into_response();
        response.extensions_mut().insert(ErrorKind(kind));
        response
    }
}
