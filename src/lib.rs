//! Model Gateway Backend Library
//!
//! Access control for the model API: revocable bearer-token authentication,
//! admin authorization, per-IP rate limiting and API key gating.

pub mod app;
pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod sweeper;

pub use app::Gateway;
pub use config::GatewayConfig;
pub use errors::GateError;
