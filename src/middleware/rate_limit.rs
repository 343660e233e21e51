//! Rate limiting middleware.
//!
//! In-memory fixed-window counters keyed per client. A window opens on the
//! first request seen for a key and counts every admission until `window`
//! has elapsed since that anchor; the next request after that opens a fresh
//! window with a count of one.
//!
//! Fixed windows are not a sliding log: a client that spends its whole
//! allowance at the very end of one window and again at the start of the
//! next gets up to `2 * limit` requests through in a span shorter than
//! `window`. That is accepted behaviour for this limiter.

use crate::errors::GateError;
use crate::sweeper::Sweep;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Configuration for one rate limiting tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum admitted requests per window.
    pub max_requests: u32,
    /// Window duration, measured from the first request of the window.
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(100)
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Exceeded { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    anchor: Instant,
}

/// Table of fixed windows shared by the IP limiter and the API key usage tracker.
///
/// The limit is supplied per call so one table can serve keys that each carry
/// their own allowance.
pub(crate) struct FixedWindowTable<K> {
    window: Duration,
    entries: Mutex<HashMap<K, RateWindow>>,
}

impl<K: Eq + Hash + Clone> FixedWindowTable<K> {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn window(&self) -> Duration {
        self.window
    }

    /// Check-then-increment under the table lock.
    pub(crate) fn admit_at(&self, key: &K, limit: u32, now: Instant) -> Admission {
        let mut entries = self.entries.lock();

        let entry = entries.entry(key.clone()).or_insert(RateWindow {
            count: 0,
            anchor: now,
        });

        // A new key or an expired window always starts over at one.
        if entry.count == 0 || now.duration_since(entry.anchor) >= self.window {
            entry.count = 1;
            entry.anchor = now;
            return Admission::Allowed {
                remaining: limit.saturating_sub(1),
            };
        }

        if entry.count < limit {
            entry.count += 1;
            Admission::Allowed {
                remaining: limit - entry.count,
            }
        } else {
            Admission::Exceeded {
                retry_after: (entry.anchor + self.window).saturating_duration_since(now),
            }
        }
    }

    /// Drop every key whose window anchor is older than `window`.
    pub(crate) fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        let window = self.window;
        entries.retain(|_, entry| now.duration_since(entry.anchor) <= window);
        before - entries.len()
    }

    pub(crate) fn count(&self, key: &K) -> Option<u32> {
        self.entries.lock().get(key).map(|entry| entry.count)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Per-key admission control with a fixed request count per window.
pub struct RateLimiter<K = IpAddr> {
    limit: u32,
    table: FixedWindowTable<K>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limit: config.max_requests,
            table: FixedWindowTable::new(config.window),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.table.window()
    }

    /// Whether a request for `key` is admitted right now.
    pub fn allow(&self, key: &K) -> bool {
        self.check(key).is_allowed()
    }

    pub fn check(&self, key: &K) -> Admission {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &K, now: Instant) -> Admission {
        self.table.admit_at(key, self.limit, now)
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        self.table.sweep_at(now)
    }

    /// Current count in the key's window, if the key is tracked.
    pub fn count(&self, key: &K) -> Option<u32> {
        self.table.count(key)
    }

    pub fn tracked_keys(&self) -> usize {
        self.table.len()
    }
}

impl<K: Eq + Hash + Clone + Send + 'static> Sweep for RateLimiter<K> {
    fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }
}

/// Per-IP rate limiting middleware.
pub async fn ip_rate_limit(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter<IpAddr>>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GateError> {
    let ip = addr.ip();

    match limiter.check(&ip) {
        Admission::Allowed { .. } => Ok(next.run(request).await),
        Admission::Exceeded { retry_after } => {
            warn!(
                ip = %ip,
                limit = limiter.limit(),
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            Err(GateError::RateLimitExceeded { retry_after })
        }
    }
}
