//! Caller context extractors.
//!
//! The authenticating BFF terminates the customer session and forwards
//! identity as headers; these extractors are the only place the service
//! reads them. Headers are trusted because the BFF is the sole ingress.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

const ACCOUNT_HEADER: &str = "X-Account-ID";
const STAFF_ROLE_HEADER: &str = "X-Staff-Role";

const STAFF_ROLES: &[&str] = &["station_agent", "fleet_manager", "admin"];

/// Customer (or staff member acting on their own account) context.
#[derive(Debug, Clone)]
pub struct AccountContext {
    pub account_id: Uuid,
    pub staff_role: Option<String>,
}

impl AccountContext {
    pub fn is_staff(&self) -> bool {
        self.staff_role.is_some()
    }

    /// Whether this caller may act on `owner`'s resources.
    pub fn can_access(&self, owner: Uuid) -> bool {
        self.account_id == owner || self.is_staff()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AccountContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account_id = parts
            .headers
            .get(ACCOUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::AuthError(anyhow::anyhow!(
                    "Missing X-Account-ID header (required from BFF)"
                ))
            })?;

        let account_id = Uuid::parse_str(account_id)
            .map_err(|_| AppError::AuthError(anyhow::anyhow!("Invalid X-Account-ID header")))?;

        let staff_role = staff_role_from(parts)?;

        let span = tracing::Span::current();
        span.record("account_id", account_id.to_string().as_str());
        if let Some(ref role) = staff_role {
            span.record("staff_role", role.as_str());
        }

        Ok(AccountContext {
            account_id,
            staff_role,
        })
    }
}

/// Staff-only context for station and fleet operations.
#[derive(Debug, Clone)]
pub struct StaffContext {
    pub role: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for StaffContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let role = staff_role_from(parts)?.ok_or_else(|| {
            AppError::Forbidden(anyhow::anyhow!("Staff role required for this operation"))
        })?;

        Ok(StaffContext { role })
    }
}

fn staff_role_from(parts: &Parts) -> Result<Option<String>, AppError> {
    let Some(raw) = parts.headers.get(STAFF_ROLE_HEADER) else {
        return Ok(None);
    };
    let role = raw
        .to_str()
        .map_err(|_| AppError::AuthError(anyhow::anyhow!("Invalid X-Staff-Role header")))?;

    if !STAFF_ROLES.contains(&role) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Unknown staff role '{}'",
            role
        )));
    }

    Ok(Some(role.to_string()))
}
