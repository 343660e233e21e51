//! Request-scoped auth context
//!
//! Each gate adds what it verified to a single typed value in the request
//! extensions; handlers read it back through the extractors below.

use crate::auth::models::{AuthenticatedIdentity, VerifiedApiKey};
use crate::errors::GateError;
use axum::{async_trait, extract::FromRequestParts, extract::Request, http::request::Parts};

/// Bearer token exactly as the client presented it, kept for logout/revocation.
#[derive(Clone, PartialEq, Eq)]
pub struct RawToken(String);

impl RawToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print the token itself.
impl std::fmt::Debug for RawToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RawToken(..)")
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: Option<AuthenticatedIdentity>,
    pub raw_token: Option<RawToken>,
    pub api_key: Option<VerifiedApiKey>,
}

impl RequestContext {
    pub fn of(req: &Request) -> Option<&RequestContext> {
        req.extensions().get::<RequestContext>()
    }

    /// Apply `f` to the request's context, creating an empty one first if needed.
    pub fn update(req: &mut Request, f: impl FnOnce(&mut RequestContext)) {
        let mut ctx = req
            .extensions_mut()
            .remove::<RequestContext>()
            .unwrap_or_default();
        f(&mut ctx);
        req.extensions_mut().insert(ctx);
    }

    pub fn identity(req: &Request) -> Option<&AuthenticatedIdentity> {
        Self::of(req).and_then(|ctx| ctx.identity.as_ref())
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Extracting an identity on a route without the authentication gate is a wiring fault.
#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedIdentity {
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.identity.clone())
            .ok_or(GateError::MissingIdentity)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for VerifiedApiKey {
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.api_key.clone())
            .ok_or(GateError::CredentialMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use uuid::Uuid;

    fn identity() -> AuthenticatedIdentity {
        AuthenticatedIdentity {
            user_id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            is_admin: false,
            is_active: true,
        }
    }

    #[test]
    fn test_context_populated_incrementally() {
        let mut req = Request::new(Body::empty());
        assert!(RequestContext::of(&req).is_none());

        let id = identity();
        RequestContext::update(&mut req, |ctx| {
            ctx.identity = Some(id.clone());
            ctx.raw_token = Some(RawToken::new("abc"));
        });
        RequestContext::update(&mut req, |ctx| {
            ctx.api_key = Some(VerifiedApiKey {
                id: Uuid::new_v4(),
                owner_id: id.user_id,
                name: "ci".to_string(),
                rate_limit: 10,
            });
        });

        let ctx = RequestContext::of(&req).unwrap();
        assert_eq!(ctx.identity.as_ref(), Some(&id));
        assert_eq!(ctx.raw_token.as_ref().map(RawToken::as_str), Some("abc"));
        assert!(ctx.api_key.is_some());
    }

    #[test]
    fn test_raw_token_debug_is_redacted() {
        let token = RawToken::new("secret-token");
        assert!(!format!("{:?}", token).contains("secret"));
    }

    #[tokio::test]
    async fn test_identity_extractor_without_gate_is_wiring_fault() {
        let (mut parts, _) = Request::new(Body::empty()).into_parts();
        let result = AuthenticatedIdentity::from_request_parts(&mut parts, &()).await;
        assert_eq!(result.unwrap_err(), GateError::MissingIdentity);
    }
}
