//! Gateway assembly
//!
//! Builds every stateful service once, wires the gate chains onto routes, and
//! hands back the sweeps that keep the in-memory tables bounded.

use crate::auth::{
    admin_middleware, api as auth_api, api_key_middleware, auth_middleware, ApiKeyGate,
    ApiKeyStore, AuthGate, AuthState, IdentityProvider, TokenRevocationRegistry, UsageTracker,
    UserStore,
};
use crate::config::GatewayConfig;
use crate::middleware::{ip_rate_limit, request_logging, RateLimiter};
use crate::sweeper::Sweeper;
use anyhow::{Context, Result};
use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use std::net::IpAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Process-wide access-control services, created once at startup
#[derive(Clone)]
pub struct Gateway {
    pub config: Arc<GatewayConfig>,
    pub revocations: Arc<TokenRevocationRegistry>,
    pub usage: Arc<UsageTracker>,
    pub api_limiter: Arc<RateLimiter<IpAddr>>,
    pub admin_limiter: Arc<RateLimiter<IpAddr>>,
    pub auth_gate: AuthGate,
    pub api_key_gate: ApiKeyGate,
    pub auth_state: AuthState,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        provider: Arc<dyn IdentityProvider>,
        users: Arc<dyn UserStore>,
        keys: Arc<dyn ApiKeyStore>,
    ) -> Self {
        let revocations = Arc::new(TokenRevocationRegistry::new());
        let usage = Arc::new(UsageTracker::new(
            config.key_window,
            config.key_default_limit,
        ));

        let auth_gate = AuthGate::new(revocations.clone(), provider, users);
        let api_key_gate = ApiKeyGate::new(keys.clone(), usage.clone(), config.last_used_policy);
        let auth_state = AuthState {
            revocations: revocations.clone(),
            key_store: keys,
            usage: usage.clone(),
            default_revocation_ttl: config.revocation_default_ttl,
        };

        Self {
            api_limiter: Arc::new(RateLimiter::new(config.api_limit)),
            admin_limiter: Arc::new(RateLimiter::new(config.admin_limit)),
            config: Arc::new(config),
            revocations,
            usage,
            auth_gate,
            api_key_gate,
            auth_state,
        }
    }

    /// All routes with their gate chains.
    ///
    /// Layers run outermost-first, so each `route_layer` list reads bottom-up:
    /// authentication, then authorization, then rate limiting.
    pub fn router(&self) -> Router {
        let session_routes = Router::new()
            .route("/api/auth/logout", post(auth_api::logout))
            .route("/api/auth/me", get(auth_api::get_current_user))
            .route("/api/keys", post(auth_api::create_api_key))
            .route_layer(middleware::from_fn_with_state(
                self.api_limiter.clone(),
                ip_rate_limit,
            ))
            .route_layer(middleware::from_fn_with_state(
                self.auth_gate.clone(),
                auth_middleware,
            ))
            .with_state(self.auth_state.clone());

        let admin_routes = Router::new()
            .route(
                "/api/admin/revocations",
                get(auth_api::revocation_stats).post(auth_api::revoke_token),
            )
            .route_layer(middleware::from_fn_with_state(
                self.admin_limiter.clone(),
                ip_rate_limit,
            ))
            .route_layer(middleware::from_fn(admin_middleware))
            .route_layer(middleware::from_fn_with_state(
                self.auth_gate.clone(),
                auth_middleware,
            ))
            .with_state(self.auth_state.clone());

        let key_routes = Router::new()
            .route("/api/v1/key", get(auth_api::get_current_key))
            .route_layer(middleware::from_fn_with_state(
                self.api_key_gate.clone(),
                api_key_middleware,
            ));

        let public_routes = Router::new().route("/health", get(health_check));

        Router::new()
            .merge(public_routes)
            .merge(session_routes)
            .merge(admin_routes)
            .merge(key_routes)
            .layer(middleware::from_fn(request_logging))
    }

    /// Start one sweep per table
    pub fn spawn_sweeps(&self) -> Sweeper {
        let mut sweeper = Sweeper::new();
        sweeper.spawn(
            "token_revocations",
            self.config.revocation_sweep_interval,
            self.revocations.clone(),
        );
        sweeper.spawn(
            "api_rate_limit",
            self.api_limiter.window(),
            self.api_limiter.clone(),
        );
        sweeper.spawn(
            "admin_rate_limit",
            self.admin_limiter.window(),
            self.admin_limiter.clone(),
        );
        sweeper.spawn(
            "api_key_usage",
            self.config.key_usage_sweep_interval,
            self.usage.clone(),
        );
        sweeper
    }
}

/// CORS from ALLOWED_ORIGINS (comma separated), permissive when unset
pub fn cors_layer(allowed_origins: Option<&str>) -> Result<CorsLayer> {
    let Some(raw) = allowed_origins else {
        return Ok(CorsLayer::permissive());
    };

    let origins = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("Invalid origin: {}", o)))
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any))
}

async fn health_check() -> &'static str {
    "Model gateway operational"
}
