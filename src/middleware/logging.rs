//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, status code, and latency, and
//! calls out gate rejections separately so denied and throttled traffic is
//! easy to filter.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{info, warn};

/// How a finished request should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Denied,
    Throttled,
    Failed,
}

impl Outcome {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Outcome::Denied,
            StatusCode::TOO_MANY_REQUESTS => Outcome::Throttled,
            s if s.is_server_error() => Outcome::Failed,
            _ => Outcome::Completed,
        }
    }
}

/// Middleware that logs HTTP requests with timing information.
pub async fn request_logging(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Skip logging for health checks to reduce noise
    if path == "/health" {
        return next.run(request).await;
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status();
    let client_ip = addr.ip();

    match Outcome::from_status(status) {
        Outcome::Failed => warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms,
            client_ip = %client_ip,
            "Request failed (5xx)"
        ),
        Outcome::Denied => info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms,
            client_ip = %client_ip,
            "Request denied"
        ),
        Outcome::Throttled => info!(
            method = %method,
            path = %path,
            latency_ms,
            client_ip = %client_ip,
            "Request throttled"
        ),
        Outcome::Completed => info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms,
            "Request completed"
        ),
    }

    response
}
