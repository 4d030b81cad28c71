//! Per-caller fixed-window rate limiting

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::gateway::{ApiError, AppState};

/// Most callers tracked at once; new callers are refused beyond this
const MAX_TRACKED_CALLERS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by caller
#[derive(Debug)]
pub struct RateLimiter {
    /// Requests allowed per window; 0 disables limiting
    limit: u32,
    window: Duration,
    max_callers: usize,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            max_callers: MAX_TRACKED_CALLERS,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Override the number of callers tracked at once
    pub fn with_max_callers(mut self, max_callers: usize) -> Self {
        self.max_callers = max_callers;
        self
    }

    /// Record a request from `caller`, returning whether it is allowed
    pub fn check(&self, caller: &str) -> bool {
        self.check_at(caller, Instant::now())
    }

    /// Same as [`check()`](Self::check) at an explicit point in time
    pub fn check_at(&self, caller: &str, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }

        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        if !windows.contains_key(caller) && windows.len() >= self.max_callers {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
            if windows.len() >= self.max_callers {
                return false;
            }
        }

        let entry = windows.entry(caller.to_owned()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.limit {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Number of callers currently tracked
    pub fn tracked(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Identify the caller by peer address
///
/// The first `x-forwarded-for` hop is used instead only when
/// `trust_forwarded_for` is set, since clients control that header.
pub fn caller_id(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    let forwarded = trust_forwarded_for
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_owned);

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_owned())
}

pub async fn limit_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let caller = caller_id(request.headers(), peer, state.trust_forwarded_for);

    if !state.limiter.check(&caller) {
        debug!(caller = %caller, "rate limit exceeded");
        return ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Too many requests, slow down",
        )
        .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_per_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("a", now));
        assert!(limiter.check_at("a", now));
        assert!(!limiter.check_at("a", now));
        // Other callers have their own window
        assert!(limiter.check_at("b", now));
    }

    #[test]
    fn window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("a", now));
        assert!(!limiter.check_at("a", now + Duration::from_secs(59)));
        assert!(limiter.check_at("a", now + Duration::from_secs(60)));
    }

    #[test]
    fn zero_limit_disables() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        for _ in 0..100 {
            assert!(limiter.check("a"));
        }
        assert_eq!(limiter.tracked(), 0);
    }

    #[test]
    fn full_table_refuses_new_callers() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1)).with_max_callers(3);
        let now = Instant::now();
        for caller in ["a", "b", "c"] {
            assert!(limiter.check_at(caller, now));
        }

        assert!(!limiter.check_at("d", now));
        // Known callers keep their window
        assert!(limiter.check_at("a", now));
        assert_eq!(limiter.tracked(), 3);

        // Expired windows make room again
        assert!(limiter.check_at("d", now + Duration::from_secs(2)));
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn rotating_forwarded_header_shares_peer_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let peer: SocketAddr = "192.0.2.1:5555".parse().unwrap();

        let allowed = (0..50)
            .filter(|i| {
                let mut headers = HeaderMap::new();
                headers.insert("x-forwarded-for", format!("10.0.0.{i}").parse().unwrap());
                limiter.check(&caller_id(&headers, Some(peer), false))
            })
            .count();

        assert_eq!(allowed, 2);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn caller_from_trusted_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        assert_eq!(caller_id(&headers, Some(peer), true), "203.0.113.7");
        assert_eq!(caller_id(&headers, Some(peer), false), "127.0.0.1");
    }

    #[test]
    fn caller_from_peer_address() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "192.0.2.1:5555".parse().unwrap();
        assert_eq!(caller_id(&headers, Some(peer), true), "192.0.2.1");
        assert_eq!(caller_id(&headers, None, false), "unknown");
    }
}
