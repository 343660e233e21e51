//! Authentication Models
//! Mission: Define the identity and API key records the gates work with

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local user record as stored in the `users` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    /// Local copy only; the identity provider's claim wins
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_active: bool,
}

/// Claims the identity provider asserts for a validated session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderClaims {
    pub subject_id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

/// Identity attached to a request once the authentication gate has passed
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub is_active: bool,
}

impl AuthenticatedIdentity {
    /// Merge provider claims onto the local record.
    ///
    /// The provider is authoritative for the admin flag; the local copy may be stale.
    pub fn resolve(claims: &ProviderClaims, user: &UserRecord) -> Self {
        let email = if user.email.is_empty() {
            claims.email.clone()
        } else {
            user.email.clone()
        };

        Self {
            user_id: user.id,
            email,
            is_admin: claims.is_admin,
            is_active: user.is_active,
        }
    }
}

/// API key record as stored in the `api_keys` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key_hash: String,
    #[serde(default)]
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Requests per minute; non-positive means "use the gateway default"
    #[serde(default)]
    pub rate_limit: i64,
}

/// The subset of a key record exposed to handlers after the API key gate
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VerifiedApiKey {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub rate_limit: u32,
}

/// API key creation request
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub rate_limit: Option<i64>,
}

/// API key creation response; the plaintext key is only ever shown here
#[derive(Debug, Serialize)]
pub struct ApiKeyCreatedResponse {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub rate_limit: u32,
    pub created_at: DateTime<Utc>,
}

/// Administrative revocation request
#[derive(Debug, Deserialize)]
pub struct RevokeTokenRequest {
    pub token: String,
    pub ttl_secs: Option<u64>,
}
