//! Identity Provider Client
//! Mission: Delegate session token validation to the external identity provider

use crate::auth::models::ProviderClaims;
use reqwest::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

/// Why the provider did not return claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider answered and refused the token
    Rejected,
    /// The provider could not be reached or answered with garbage
    Unavailable(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Rejected => write!(f, "token rejected by identity provider"),
            ProviderError::Unavailable(reason) => {
                write!(f, "identity provider unavailable: {}", reason)
            }
        }
    }
}

impl std::error::Error for ProviderError {}

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate `token` and return the subject it was issued to.
    ///
    /// Single attempt; no retry.
    async fn validate_token(&self, token: &str) -> Result<ProviderClaims, ProviderError>;
}

/// Supabase GoTrue style provider: `GET {base}/auth/v1/user`
pub struct SupabaseIdentityProvider {
    http_client: reqwest::Client,
    user_url: String,
    anon_key: String,
}

impl SupabaseIdentityProvider {
    pub fn new(http_client: reqwest::Client, base_url: &str, anon_key: impl Into<String>) -> Self {
        Self {
            http_client,
            user_url: format!("{}/auth/v1/user", base_url.trim_end_matches('/')),
            anon_key: anon_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    app_metadata: serde_json::Value,
}

impl ProviderUser {
    fn into_claims(self) -> ProviderClaims {
        // Anything but a literal `true` is treated as not admin.
        let is_admin = self
            .app_metadata
            .get("is_admin")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        ProviderClaims {
            subject_id: self.id,
            email: self.email.unwrap_or_default(),
            is_admin,
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn validate_token(&self, token: &str) -> Result<ProviderClaims, ProviderError> {
        let resp = self
            .http_client
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST
            | StatusCode::NOT_FOUND => return Err(ProviderError::Rejected),
            s => return Err(ProviderError::Unavailable(format!("status {}", s))),
        }

        let user = resp
            .json::<ProviderUser>()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("invalid user payload: {}", e)))?;

        Ok(user.into_claims())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_claim_from_app_metadata() {
        let user: ProviderUser = serde_json::from_str(
            r#"{
                "id": "6f1c2d4e-8a9b-4c3d-9e8f-7a6b5c4d3e2f",
                "email": "admin@example.com",
                "app_metadata": { "provider": "email", "is_admin": true }
            }"#,
        )
        .unwrap();

        let claims = user.into_claims();
        assert!(claims.is_admin);
        assert_eq!(claims.email, "admin@example.com");
    }

    #[test]
    fn test_non_boolean_admin_claim_is_not_admin() {
        let user: ProviderUser = serde_json::from_str(
            r#"{
                "id": "6f1c2d4e-8a9b-4c3d-9e8f-7a6b5c4d3e2f",
                "app_metadata": { "is_admin": "true" }
            }"#,
        )
        .unwrap();

        let claims = user.into_claims();
        assert!(!claims.is_admin);
        assert!(claims.email.is_empty());
    }

    #[test]
    fn test_missing_metadata_is_not_admin() {
        let user: ProviderUser =
            serde_json::from_str(r#"{"id": "6f1c2d4e-8a9b-4c3d-9e8f-7a6b5c4d3e2f"}"#).unwrap();
        assert!(!user.into_claims().is_admin);
    }

    #[test]
    fn test_user_url_normalised() {
        let provider =
            SupabaseIdentityProvider::new(reqwest::Client::new(), "https://x.supabase.co/", "anon");
        assert_eq!(provider.user_url, "https://x.supabase.co/auth/v1/user");
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_unavailable() {
        let provider = SupabaseIdentityProvider::new(
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(200))
                .build()
                .unwrap(),
            "http://127.0.0.1:9",
            "anon",
        );

        match provider.validate_token("token").await {
            Err(ProviderError::Unavailable(_)) => {}
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }
}
