//! Session token lifetime
//! Mission: Work out how long a revocation has to last
//!
//! Tokens are validated by the identity provider, never here. This only reads
//! the `exp` claim of a token the provider has already accepted so a logout
//! revokes it exactly until it would have expired anyway.

use crate::auth::revocation::MAX_REVOCATION_TTL;
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Unix timestamp of the token's `exp` claim, read without signature verification
pub fn token_expiry(token: &str) -> Result<i64> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation)
        .context("Token has no readable exp claim")?;

    Ok(data.claims.exp)
}

/// Time left until the token expires, or `fallback` when that cannot be read.
///
/// Never longer than [`MAX_REVOCATION_TTL`].
pub fn remaining_lifetime(token: &str, fallback: Duration) -> Duration {
    remaining_lifetime_at(token, fallback, Utc::now().timestamp())
}

pub fn remaining_lifetime_at(token: &str, fallback: Duration, now_unix: i64) -> Duration {
    match token_expiry(token) {
        Ok(exp) if exp > now_unix => {
            let secs = u64::try_from(exp.saturating_sub(now_unix)).unwrap_or(u64::MAX);
            Duration::from_secs(secs).min(MAX_REVOCATION_TTL)
        }
        // Already expired: the provider will refuse it on its own.
        Ok(_) => Duration::ZERO,
        Err(_) => fallback.min(MAX_REVOCATION_TTL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        aud: String,
        exp: i64,
    }

    fn token_expiring_at(exp: i64) -> String {
        let claims = TestClaims {
            sub: "6f1c2d4e-8a9b-4c3d-9e8f-7a6b5c4d3e2f".to_string(),
            aud: "authenticated".to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"provider-secret-we-do-not-know"),
        )
        .unwrap()
    }

    #[test]
    fn test_reads_exp_without_knowing_secret() {
        let exp = Utc::now().timestamp() + 3600;
        assert_eq!(token_expiry(&token_expiring_at(exp)).unwrap(), exp);
    }

    #[test]
    fn test_remaining_lifetime() {
        let now = 1_700_000_000;
        let token = token_expiring_at(now + 900);
        let fallback = Duration::from_secs(3600);

        assert_eq!(
            remaining_lifetime_at(&token, fallback, now),
            Duration::from_secs(900)
        );
        assert_eq!(
            remaining_lifetime_at(&token, fallback, now + 1000),
            Duration::ZERO
        );
    }

    #[test]
    fn test_far_future_exp_is_capped() {
        let now = 1_700_000_000;
        let token = token_expiring_at(i64::MAX);
        assert_eq!(
            remaining_lifetime_at(&token, Duration::from_secs(3600), now),
            MAX_REVOCATION_TTL
        );
        assert_eq!(
            remaining_lifetime_at(&token, Duration::from_secs(3600), i64::MIN),
            MAX_REVOCATION_TTL
        );
    }

    #[test]
    fn test_opaque_token_uses_fallback() {
        let fallback = Duration::from_secs(3600);
        assert_eq!(remaining_lifetime("not-a-jwt", fallback), fallback);
        assert!(token_expiry("a.b.c").is_err());
    }
}
