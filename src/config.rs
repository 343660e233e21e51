//! Gateway configuration loaded from the environment

use crate::auth::api_key::LastUsedPolicy;
use crate::middleware::rate_limit::RateLimitConfig;
use anyhow::{bail, Result};
use std::env;
use std::time::Duration;

/// Where users and API keys live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Remote PostgREST endpoint under the provider URL
    Rest,
    /// Local SQLite file, for development
    Sqlite { path: String },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub provider_url: String,
    pub provider_anon_key: String,
    /// Key used for store access; falls back to the anon key
    pub store_service_key: Option<String>,
    pub store_backend: StoreBackend,
    /// Per-call timeout for provider and store requests
    pub upstream_timeout: Duration,
    pub allowed_origins: Option<String>,

    pub revocation_sweep_interval: Duration,
    /// Revocation lifetime when a token's own expiry cannot be read
    pub revocation_default_ttl: Duration,

    pub api_limit: RateLimitConfig,
    pub admin_limit: RateLimitConfig,

    pub key_window: Duration,
    pub key_default_limit: u32,
    pub key_usage_sweep_interval: Duration,
    pub last_used_policy: LastUsedPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            provider_url: String::new(),
            provider_anon_key: String::new(),
            store_service_key: None,
            store_backend: StoreBackend::Rest,
            upstream_timeout: Duration::from_secs(10),
            allowed_origins: None,
            revocation_sweep_interval: Duration::from_secs(15 * 60),
            revocation_default_ttl: Duration::from_secs(3600),
            api_limit: RateLimitConfig::per_minute(100),
            admin_limit: RateLimitConfig::per_minute(50),
            key_window: Duration::from_secs(60),
            key_default_limit: 60,
            key_usage_sweep_interval: Duration::from_secs(15 * 60),
            last_used_policy: LastUsedPolicy::BestEffort,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = env_nonempty("PORT") {
            config.bind_addr = format!("0.0.0.0:{}", port.trim_start_matches(':'));
        }
        if let Some(addr) = env_nonempty("BIND_ADDR") {
            config.bind_addr = addr;
        }

        config.provider_url = env_nonempty("SUPABASE_URL").unwrap_or_default();
        config.provider_anon_key = env_nonempty("SUPABASE_ANON_KEY")
            .or_else(|| env_nonempty("SUPABASE_ANNON_KEY"))
            .unwrap_or_default();
        config.store_service_key = env_nonempty("SUPABASE_SERVICE_KEY");
        config.allowed_origins = env_nonempty("ALLOWED_ORIGINS");

        if let Some(path) = env_nonempty("STORE_SQLITE_PATH") {
            config.store_backend = StoreBackend::Sqlite { path };
        }

        if let Some(timeout) = env_parse::<u64>("UPSTREAM_TIMEOUT_MS") {
            config.upstream_timeout = Duration::from_millis(timeout);
        }
        if let Some(every) = env_secs("REVOCATION_SWEEP_SECS") {
            config.revocation_sweep_interval = every;
        }
        if let Some(ttl) = env_secs("REVOCATION_DEFAULT_TTL_SECS") {
            config.revocation_default_ttl = ttl;
        }

        if let Some(n) = env_parse("API_RATE_LIMIT") {
            config.api_limit.max_requests = n;
        }
        if let Some(n) = env_parse("ADMIN_RATE_LIMIT") {
            config.admin_limit.max_requests = n;
        }
        if let Some(window) = env_secs("RATE_LIMIT_WINDOW_SECS") {
            config.api_limit.window = window;
            config.admin_limit.window = window;
        }

        if let Some(window) = env_secs("API_KEY_WINDOW_SECS") {
            config.key_window = window;
        }
        if let Some(n) = env_parse("API_KEY_DEFAULT_RATE_LIMIT") {
            config.key_default_limit = n;
        }
        if let Some(every) = env_secs("API_KEY_USAGE_SWEEP_SECS") {
            config.key_usage_sweep_interval = every;
        }
        if let Some(raw) = env_nonempty("API_KEY_LAST_USED_POLICY") {
            config.last_used_policy = match LastUsedPolicy::from_str(&raw) {
                Some(policy) => policy,
                None => bail!("Unknown API_KEY_LAST_USED_POLICY: {}", raw),
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Startup checks; a failure here stops the server before it binds
    pub fn validate(&self) -> Result<()> {
        if self.provider_url.is_empty() || self.provider_anon_key.is_empty() {
            bail!("SUPABASE_URL and SUPABASE_ANON_KEY must be set");
        }
        for (name, limit) in [
            ("api", &self.api_limit),
            ("admin", &self.admin_limit),
        ] {
            if limit.max_requests == 0 || limit.window.is_zero() {
                bail!("Rate limit tier '{}' must have a positive limit and window", name);
            }
        }
        if self.key_window.is_zero() || self.key_default_limit == 0 {
            bail!("API key window and default limit must be positive");
        }
        if self.revocation_sweep_interval.is_zero() || self.key_usage_sweep_interval.is_zero() {
            bail!("Sweep intervals must be positive");
        }
        Ok(())
    }

    pub fn store_key(&self) -> &str {
        self.store_service_key
            .as_deref()
            .unwrap_or(&self.provider_anon_key)
    }
}
