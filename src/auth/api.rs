//! Authentication API Endpoints
//! Mission: Session logout, identity lookup, API key issuance and admin revocation

use crate::auth::{
    api_key::{generate_api_key, hash_api_key, UsageTracker},
    context::RequestContext,
    jwt::remaining_lifetime,
    models::{
        ApiKeyCreatedResponse, ApiKeyRecord, AuthenticatedIdentity, CreateApiKeyRequest,
        RevokeTokenRequest, VerifiedApiKey,
    },
    revocation::{TokenRevocationRegistry, MAX_REVOCATION_TTL},
    store::ApiKeyStore,
};
use crate::errors::GateError;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_KEY_NAME_LEN: usize = 100;

/// Shared state for the auth endpoints
#[derive(Clone)]
pub struct AuthState {
    pub revocations: Arc<TokenRevocationRegistry>,
    pub key_store: Arc<dyn ApiKeyStore>,
    pub usage: Arc<UsageTracker>,
    /// Revocation lifetime for tokens whose expiry cannot be read
    pub default_revocation_ttl: Duration,
}

/// Logout - POST /api/auth/logout
///
/// Revokes the caller's own token until it would have expired.
pub async fn logout(
    State(state): State<AuthState>,
    ctx: RequestContext,
) -> Result<StatusCode, AuthApiError> {
    let identity = ctx.identity.ok_or(GateError::MissingIdentity)?;
    let token = ctx.raw_token.ok_or(GateError::MissingIdentity)?;

    let ttl = remaining_lifetime(token.as_str(), state.default_revocation_ttl);
    state.revocations.revoke(token.as_str(), ttl);

    info!(user_id = %identity.user_id, ttl_secs = ttl.as_secs(), "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// Current identity - GET /api/auth/me
pub async fn get_current_user(identity: AuthenticatedIdentity) -> Json<AuthenticatedIdentity> {
    Json(identity)
}

/// Issue an API key - POST /api/keys
pub async fn create_api_key(
    State(state): State<AuthState>,
    identity: AuthenticatedIdentity,
    Json(payload): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyCreatedResponse>), AuthApiError> {
    let name = payload.name.trim();
    if name.is_empty() || name.len() > MAX_KEY_NAME_LEN {
        return Err(AuthApiError::InvalidKeyName);
    }

    let rate_limit = match payload.rate_limit {
        Some(n) if n <= 0 => return Err(AuthApiError::InvalidRateLimit),
        Some(n) => n,
        None => i64::from(state.usage.limit_for(0)),
    };

    let key = generate_api_key();
    let record = ApiKeyRecord {
        id: Uuid::new_v4(),
        user_id: identity.user_id,
        key_hash: hash_api_key(&key),
        name: name.to_string(),
        created_at: Utc::now(),
        last_used: None,
        is_active: true,
        rate_limit,
    };

    state.key_store.insert_key(&record).await.map_err(|e| {
        warn!("Failed to store new API key: {:#}", e);
        AuthApiError::Gate(GateError::UpstreamUnavailable)
    })?;

    info!(user_id = %identity.user_id, key_id = %record.id, "API key issued");

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyCreatedResponse {
            id: record.id,
            key,
            name: record.name,
            rate_limit: state.usage.limit_for(record.rate_limit),
            created_at: record.created_at,
        }),
    ))
}

/// Verified key info - GET /api/v1/key (API key protected)
pub async fn get_current_key(key: VerifiedApiKey) -> Json<VerifiedApiKey> {
    Json(key)
}

/// Revoke an arbitrary session token - POST /api/admin/revocations (Admin only)
pub async fn revoke_token(
    State(state): State<AuthState>,
    identity: AuthenticatedIdentity,
    Json(payload): Json<RevokeTokenRequest>,
) -> Result<StatusCode, AuthApiError> {
    let token = payload.token.trim();
    if token.is_empty() {
        return Err(AuthApiError::MissingToken);
    }

    let ttl = match payload.ttl_secs {
        Some(secs) if secs > MAX_REVOCATION_TTL.as_secs() => {
            return Err(AuthApiError::InvalidTtl);
        }
        Some(secs) => Duration::from_secs(secs),
        None => remaining_lifetime(token, state.default_revocation_ttl),
    };
    state.revocations.revoke(token, ttl);

    info!(admin = %identity.user_id, ttl_secs = ttl.as_secs(), "Token revoked by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// Revocation table size - GET /api/admin/revocations (Admin only)
pub async fn revocation_stats(State(state): State<AuthState>) -> Json<serde_json::Value> {
    Json(json!({
        "revoked_tokens": state.revocations.len(),
        "tracked_api_keys": state.usage.tracked_keys(),
    }))
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    Gate(GateError),
    InvalidKeyName,
    InvalidRateLimit,
    MissingToken,
    InvalidTtl,
}

impl From<GateError> for AuthApiError {
    fn from(err: GateError) -> Self {
        AuthApiError::Gate(err)
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthApiError::Gate(err) => return err.into_response(),
            AuthApiError::InvalidKeyName => "Key name must be 1-100 characters",
            AuthApiError::InvalidRateLimit => "Rate limit must be positive",
            AuthApiError::MissingToken => "Token is required",
            AuthApiError::InvalidTtl => "ttl_secs exceeds the maximum revocation lifetime",
        };

        (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::context::RawToken;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MemoryKeys(Mutex<Vec<ApiKeyRecord>>);

    #[async_trait::async_trait]
    impl ApiKeyStore for MemoryKeys {
        async fn find_key_by_digest(&self, digest: &str) -> anyhow::Result<Option<ApiKeyRecord>> {
            Ok(self.0.lock().iter().find(|k| k.key_hash == digest).cloned())
        }

        async fn update_last_used(&self, _id: Uuid, _at: chrono::DateTime<Utc>) -> anyhow::Result<()> {
            Ok(())
        }

        async fn insert_key(&self, record: &ApiKeyRecord) -> anyhow::Result<()> {
            self.0.lock().push(record.clone());
            Ok(())
        }
    }

    fn state(keys: Arc<MemoryKeys>) -> AuthState {
        AuthState {
            revocations: Arc::new(TokenRevocationRegistry::new()),
            key_store: keys,
            usage: Arc::new(UsageTracker::new(Duration::from_secs(60), 60)),
            default_revocation_ttl: Duration::from_secs(3600),
        }
    }

    fn identity() -> AuthenticatedIdentity {
        AuthenticatedIdentity {
            user_id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            is_admin: false,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_logout_revokes_own_token() {
        let state = state(Arc::new(MemoryKeys::default()));
        let ctx = RequestContext {
            identity: Some(identity()),
            raw_token: Some(RawToken::new("opaque-session-token")),
            api_key: None,
        };

        let status = logout(State(state.clone()), ctx).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.revocations.is_revoked("opaque-session-token"));
    }

    #[tokio::test]
    async fn test_logout_without_identity_is_wiring_fault() {
        let state = state(Arc::new(MemoryKeys::default()));
        let response = logout(State(state), RequestContext::default())
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_create_api_key_stores_only_digest() {
        let keys = Arc::new(MemoryKeys::default());
        let owner = identity();

        let (status, Json(created)) = create_api_key(
            State(state(keys.clone())),
            owner.clone(),
            Json(CreateApiKeyRequest {
                name: "ci".to_string(),
                rate_limit: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.rate_limit, 60);

        let stored = keys.0.lock()[0].clone();
        assert_eq!(stored.user_id, owner.user_id);
        assert_eq!(stored.key_hash, hash_api_key(&created.key));
        assert_ne!(stored.key_hash, created.key);
    }

    #[tokio::test]
    async fn test_create_api_key_validates_input() {
        let keys = Arc::new(MemoryKeys::default());

        let err = create_api_key(
            State(state(keys.clone())),
            identity(),
            Json(CreateApiKeyRequest {
                name: "  ".to_string(),
                rate_limit: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = create_api_key(
            State(state(keys.clone())),
            identity(),
            Json(CreateApiKeyRequest {
                name: "ok".to_string(),
                rate_limit: Some(0),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert!(keys.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_admin_revoke_with_explicit_ttl() {
        let state = state(Arc::new(MemoryKeys::default()));
        let status = revoke_token(
            State(state.clone()),
            identity(),
            Json(RevokeTokenRequest {
                token: "someone-else".to_string(),
                ttl_secs: Some(30),
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.revocations.is_revoked("someone-else"));
        assert_eq!(state.revocations.len(), 1);
    }

    #[tokio::test]
    async fn test_admin_revoke_rejects_ttl_above_cap() {
        let state = state(Arc::new(MemoryKeys::default()));
        let err = revoke_token(
            State(state.clone()),
            identity(),
            Json(RevokeTokenRequest {
                token: "victim".to_string(),
                ttl_secs: Some(u64::MAX),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert!(state.revocations.is_empty());

        let status = revoke_token(
            State(state.clone()),
            identity(),
            Json(RevokeTokenRequest {
                token: "victim".to_string(),
                ttl_secs: Some(MAX_REVOCATION_TTL.as_secs()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.revocations.is_revoked("victim"));
    }
}
