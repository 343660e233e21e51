//! Authentication Module
//! Mission: Gate API access with revocable bearer tokens, admin checks and API keys

pub mod api;
pub mod api_key;
pub mod context;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod provider;
pub mod revocation;
pub mod store;
pub mod user_store;

pub use api::AuthState;
pub use api_key::{api_key_middleware, ApiKeyGate, LastUsedPolicy, UsageTracker};
pub use context::{RawToken, RequestContext};
pub use middleware::{admin_middleware, auth_middleware, AuthGate};
pub use provider::{IdentityProvider, ProviderError, SupabaseIdentityProvider};
pub use revocation::TokenRevocationRegistry;
pub use store::{ApiKeyStore, RestStore, UserStore};
pub use user_store::SqliteStore;
