//! Token Revocation Registry
//! Mission: Keep explicitly revoked session tokens unusable until they expire anyway

use crate::sweeper::Sweep;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Longest a single revocation can last; longer requests are clamped
pub const MAX_REVOCATION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Revoked tokens mapped to the instant their revocation lapses
pub struct TokenRevocationRegistry {
    entries: RwLock<HashMap<String, Instant>>,
}

impl TokenRevocationRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Mark `token` unusable for `ttl` from now
    pub fn revoke(&self, token: &str, ttl: Duration) {
        self.revoke_at(token, ttl, Instant::now());
    }

    pub fn revoke_at(&self, token: &str, ttl: Duration, now: Instant) {
        let ttl = ttl.min(MAX_REVOCATION_TTL);
        let Some(expires_at) = now.checked_add(ttl) else {
            warn!(ttl_secs = ttl.as_secs(), "Revocation lifetime out of range for this clock");
            return;
        };
        let mut entries = self.entries.write();

        // A later revocation never shortens an earlier one.
        let slot = entries.entry(token.to_string()).or_insert(expires_at);
        if *slot < expires_at {
            *slot = expires_at;
        }

        debug!(ttl_secs = ttl.as_secs(), "Token revoked");
    }

    /// True iff an unexpired revocation exists for `token`
    pub fn is_revoked(&self, token: &str) -> bool {
        self.is_revoked_at(token, Instant::now())
    }

    pub fn is_revoked_at(&self, token: &str, now: Instant) -> bool {
        {
            let entries = self.entries.read();
            match entries.get(token) {
                None => return false,
                Some(expires_at) if now < *expires_at => return true,
                Some(_) => {}
            }
        }

        // Expired: prune under the write lock, re-checking in case the token
        // was revoked again between the two locks.
        let mut entries = self.entries.write();
        match entries.get(token) {
            Some(expires_at) if now < *expires_at => true,
            Some(_) => {
                entries.remove(token);
                false
            }
            None => false,
        }
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, expires_at| now < *expires_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for TokenRevocationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Sweep for TokenRevocationRegistry {
    fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }
}
