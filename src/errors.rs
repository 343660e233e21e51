//! Gate outcomes
//! Mission: Map every access-control rejection onto one HTTP response shape

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;

/// Terminal rejection produced by one of the gates.
///
/// None of these are retried inside the gateway; the gate that raises one
/// short-circuits the middleware chain and the response is written as
/// `{"error": <message>}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    CredentialMissing,
    CredentialMalformed,
    CredentialRevoked,
    CredentialInvalid,
    AccountNotFound,
    AccountInactive,
    InsufficientRole,
    RateLimitExceeded { retry_after: Duration },
    /// Identity provider or store failed or timed out.
    UpstreamUnavailable,
    /// A route requires an identity but no authentication gate ran before it.
    MissingIdentity,
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::CredentialMissing
            | GateError::CredentialMalformed
            | GateError::CredentialRevoked
            | GateError::CredentialInvalid
            | GateError::AccountNotFound
            | GateError::AccountInactive => StatusCode::UNAUTHORIZED,
            GateError::InsufficientRole => StatusCode::FORBIDDEN,
            GateError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GateError::MissingIdentity => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message.
    ///
    /// Revoked, invalid, unknown and inactive accounts share one message so a
    /// caller cannot probe which accounts exist.
    pub fn message(&self) -> &'static str {
        match self {
            GateError::CredentialMissing => "Missing credentials",
            GateError::CredentialMalformed => "Malformed credentials",
            GateError::CredentialRevoked
            | GateError::CredentialInvalid
            | GateError::AccountNotFound
            | GateError::AccountInactive => "User not authorized",
            GateError::InsufficientRole => "Admin access required",
            GateError::RateLimitExceeded { .. } => "Rate limit exceeded",
            GateError::UpstreamUnavailable => "Upstream service unavailable",
            GateError::MissingIdentity => "User not authenticated",
        }
    }
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateError::CredentialRevoked => write!(f, "credential revoked"),
            GateError::AccountNotFound => write!(f, "account not found"),
            GateError::AccountInactive => write!(f, "account inactive"),
            GateError::RateLimitExceeded { retry_after } => {
                write!(f, "rate limit exceeded, retry after {}s", retry_after.as_secs())
            }
            other => write!(f, "{}", other.message()),
        }
    }
}

impl std::error::Error for GateError {}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.message() }));

        match self {
            GateError::RateLimitExceeded { retry_after } => {
                // Round up so clients never retry inside the window.
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_error_statuses() {
        for err in [
            GateError::CredentialMissing,
            GateError::CredentialMalformed,
            GateError::CredentialRevoked,
            GateError::CredentialInvalid,
            GateError::AccountNotFound,
            GateError::AccountInactive,
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }

        assert_eq!(
            GateError::InsufficientRole.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GateError::UpstreamUnavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GateError::MissingIdentity.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = GateError::RateLimitExceeded {
            retry_after: Duration::from_millis(1500),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
    }

    #[tokio::test]
    async fn test_error_body_is_json() {
        let response = GateError::InsufficientRole.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "Admin access required" }));
    }

    #[test]
    fn test_account_errors_do_not_leak_existence() {
        assert_eq!(
            GateError::AccountNotFound.message(),
            GateError::CredentialInvalid.message()
        );
        assert_eq!(
            GateError::AccountInactive.message(),
            GateError::CredentialInvalid.message()
        );
    }
}
