//! API Key Gate
//! Mission: Admit requests carrying a valid, active, within-quota API key
//!
//! Keys look like `sk_<uuid>_<base64url random>`. Only the SHA-256 digest is
//! stored; lookups go by digest.

use crate::auth::context::RequestContext;
use crate::auth::models::{ApiKeyRecord, VerifiedApiKey};
use crate::auth::store::ApiKeyStore;
use crate::errors::GateError;
use crate::middleware::rate_limit::{Admission, FixedWindowTable};
use crate::sweeper::Sweep;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

pub const KEY_PREFIX: &str = "sk_";
pub const API_KEY_HEADER: &str = "X-API-Key";

const RANDOM_BYTES: usize = 32;
const UUID_LEN: usize = 36;
// prefix + uuid + separator is the shortest thing worth looking up
const MIN_KEY_LEN: usize = KEY_PREFIX.len() + UUID_LEN + 1;

/// Generate a new API key string
pub fn generate_api_key() -> String {
    let mut random = [0u8; RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut random);

    format!("{}{}_{}", KEY_PREFIX, Uuid::new_v4(), URL_SAFE.encode(random))
}

/// Deterministic one-way digest used as the storage lookup key
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Structural check: prefix, embedded hyphenated UUID, non-empty base64url suffix
pub fn is_well_formed(api_key: &str) -> bool {
    if api_key.len() < MIN_KEY_LEN {
        return false;
    }
    let Some(rest) = api_key.strip_prefix(KEY_PREFIX) else {
        return false;
    };
    let Some((id, suffix)) = rest.split_once('_') else {
        return false;
    };

    id.len() == UUID_LEN
        && Uuid::parse_str(id).is_ok()
        && !suffix.is_empty()
        && suffix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'='))
}

/// Per-key admission, keyed by digest, with the limit taken from each key record
pub struct UsageTracker {
    default_limit: u32,
    table: FixedWindowTable<String>,
}

impl UsageTracker {
    pub fn new(window: Duration, default_limit: u32) -> Self {
        Self {
            default_limit,
            table: FixedWindowTable::new(window),
        }
    }

    /// Effective limit for a stored `rate_limit` value
    pub fn limit_for(&self, rate_limit: i64) -> u32 {
        if rate_limit <= 0 {
            self.default_limit
        } else {
            u32::try_from(rate_limit).unwrap_or(u32::MAX)
        }
    }

    pub fn admit(&self, digest: &str, limit: u32) -> Admission {
        self.admit_at(digest, limit, Instant::now())
    }

    pub fn admit_at(&self, digest: &str, limit: u32, now: Instant) -> Admission {
        self.table.admit_at(&digest.to_string(), limit, now)
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        self.table.sweep_at(now)
    }

    pub fn count(&self, digest: &str) -> Option<u32> {
        self.table.count(&digest.to_string())
    }

    pub fn tracked_keys(&self) -> usize {
        self.table.len()
    }
}

impl Sweep for UsageTracker {
    fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }
}

/// What to do when the `last_used` write fails after a key was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastUsedPolicy {
    /// Log and let the request through
    #[default]
    BestEffort,
    /// Fail the request as upstream unavailable
    Required,
}

impl LastUsedPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "best_effort" | "best-effort" => Some(LastUsedPolicy::BestEffort),
            "required" | "strict" => Some(LastUsedPolicy::Required),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ApiKeyGate {
    store: Arc<dyn ApiKeyStore>,
    usage: Arc<UsageTracker>,
    last_used_policy: LastUsedPolicy,
}

impl ApiKeyGate {
    pub fn new(
        store: Arc<dyn ApiKeyStore>,
        usage: Arc<UsageTracker>,
        last_used_policy: LastUsedPolicy,
    ) -> Self {
        Self {
            store,
            usage,
            last_used_policy,
        }
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// Run the full check for one presented credential
    pub async fn verify(&self, raw_key: &str) -> Result<VerifiedApiKey, GateError> {
        if !is_well_formed(raw_key) {
            return Err(GateError::CredentialMalformed);
        }

        let digest = hash_api_key(raw_key);

        let record = self
            .store
            .find_key_by_digest(&digest)
            .await
            .map_err(|e| {
                warn!("API key lookup failed: {:#}", e);
                GateError::UpstreamUnavailable
            })?
            .ok_or(GateError::CredentialInvalid)?;

        if !record.is_active {
            debug!(key_id = %record.id, "Inactive API key presented");
            return Err(GateError::CredentialInvalid);
        }

        let limit = self.usage.limit_for(record.rate_limit);
        if let Admission::Exceeded { retry_after } = self.usage.admit(&digest, limit) {
            warn!(key_id = %record.id, limit, "API key rate limit exceeded");
            return Err(GateError::RateLimitExceeded { retry_after });
        }

        self.record_usage(&record).await?;

        Ok(VerifiedApiKey {
            id: record.id,
            owner_id: record.user_id,
            name: record.name,
            rate_limit: limit,
        })
    }

    async fn record_usage(&self, record: &ApiKeyRecord) -> Result<(), GateError> {
        match self.store.update_last_used(record.id, Utc::now()).await {
            Ok(()) => Ok(()),
            Err(e) => match self.last_used_policy {
                LastUsedPolicy::BestEffort => {
                    warn!(key_id = %record.id, "Failed to update API key usage: {:#}", e);
                    Ok(())
                }
                LastUsedPolicy::Required => {
                    warn!(key_id = %record.id, "Rejecting request, API key usage not recorded: {:#}", e);
                    Err(GateError::UpstreamUnavailable)
                }
            },
        }
    }
}

fn non_blank(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|k| !k.is_empty())
}

/// Read the key from `X-API-Key`, falling back to a bearer Authorization header
fn presented_key(req: &Request) -> Option<&str> {
    let headers = req.headers();

    headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(non_blank)
        .or_else(|| {
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .and_then(non_blank)
        })
}

/// API key middleware
pub async fn api_key_middleware(
    State(gate): State<ApiKeyGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, GateError> {
    let raw_key = presented_key(&req).ok_or(GateError::CredentialMissing)?;
    let verified = gate.verify(raw_key).await?;

    debug!(key_id = %verified.id, owner = %verified.owner_id, "API key accepted");

    RequestContext::update(&mut req, |ctx| ctx.api_key = Some(verified));
    Ok(next.run(req).await)
}
