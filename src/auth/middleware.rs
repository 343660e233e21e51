//! Authentication Middleware
//! Mission: Protect API endpoints with provider-validated bearer tokens and admin checks

use crate::auth::{
    context::{RawToken, RequestContext},
    models::AuthenticatedIdentity,
    provider::{IdentityProvider, ProviderError},
    revocation::TokenRevocationRegistry,
    store::UserStore,
};
use crate::errors::GateError;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything the authentication gate needs, shared across requests
#[derive(Clone)]
pub struct AuthGate {
    revocations: Arc<TokenRevocationRegistry>,
    provider: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserStore>,
}

impl AuthGate {
    pub fn new(
        revocations: Arc<TokenRevocationRegistry>,
        provider: Arc<dyn IdentityProvider>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            revocations,
            provider,
            users,
        }
    }

    pub fn revocations(&self) -> &Arc<TokenRevocationRegistry> {
        &self.revocations
    }

    /// Validate a bearer token and resolve the local identity behind it
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedIdentity, GateError> {
        // Revocation wins over whatever the provider would say.
        if self.revocations.is_revoked(token) {
            debug!("Rejected revoked token");
            return Err(GateError::CredentialRevoked);
        }

        let claims = self
            .provider
            .validate_token(token)
            .await
            .map_err(|e| match e {
                ProviderError::Rejected => GateError::CredentialInvalid,
                ProviderError::Unavailable(reason) => {
                    warn!("Identity provider unavailable: {}", reason);
                    GateError::UpstreamUnavailable
                }
            })?;

        let user = self
            .users
            .find_user_by_subject_id(claims.subject_id)
            .await
            .map_err(|e| {
                warn!("User lookup failed: {:#}", e);
                GateError::UpstreamUnavailable
            })?
            .ok_or_else(|| {
                debug!(subject = %claims.subject_id, "No local user for subject");
                GateError::AccountNotFound
            })?;

        if !user.is_active {
            debug!(user_id = %user.id, "Inactive account");
            return Err(GateError::AccountInactive);
        }

        Ok(AuthenticatedIdentity::resolve(&claims, &user))
    }
}

/// Pull the token out of `Authorization: Bearer <token>`
pub fn bearer_token(req: &Request) -> Result<&str, GateError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(GateError::CredentialMissing)?;

    let value = header.to_str().map_err(|_| GateError::CredentialMalformed)?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() && !token.contains(char::is_whitespace) => {
            Ok(token)
        }
        _ => Err(GateError::CredentialMalformed),
    }
}

/// Auth middleware that validates bearer tokens
pub async fn auth_middleware(
    State(gate): State<AuthGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, GateError> {
    let token = bearer_token(&req)?.to_string();
    let identity = gate.authenticate(&token).await?;

    debug!(user_id = %identity.user_id, admin = identity.is_admin, "Authenticated request");

    RequestContext::update(&mut req, |ctx| {
        ctx.identity = Some(identity);
        ctx.raw_token = Some(RawToken::new(token));
    });

    Ok(next.run(req).await)
}

/// Admin-only middleware; must run after [`auth_middleware`]
pub async fn admin_middleware(req: Request, next: Next) -> Result<Response, GateError> {
    let identity = RequestContext::identity(&req).ok_or_else(|| {
        warn!(path = %req.uri().path(), "Admin route reached without authentication");
        GateError::MissingIdentity
    })?;

    if !identity.is_admin {
        debug!(user_id = %identity.user_id, "Admin access denied");
        return Err(GateError::InsufficientRole);
    }

    Ok(next.run(req).await)
}
