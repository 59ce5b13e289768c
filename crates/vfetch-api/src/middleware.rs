//! Rate limiting and request-level middleware.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderValue, Request, Response};
use axum::middleware::Next;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

/// Upper bound on tracked client keys; prevents unbounded growth from
/// clients spraying many addresses.
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Per-client sliding-window rate limiter.
///
/// Keeps the ordered timestamps of accepted requests per client key,
/// pruned to the trailing window on every check. State is process-local
/// and resets on restart; the `RwLock` serializes mutation so concurrent
/// requests cannot lose updates. Single-instance deployments only; there
/// is no cross-process coordination.
pub struct SlidingWindowLimiter {
    windows: RwLock<HashMap<String, VecDeque<Instant>>>,
    limit: usize,
    window: Duration,
}

impl SlidingWindowLimiter {
    /// Create a limiter allowing `limit` requests per `window` per client.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            limit: limit.max(1) as usize,
            window,
        }
    }

    /// Check and record a request for the client key. Returns false
    /// (without recording) when the client is over the limit.
    pub async fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now()).await
    }

    async fn check_at(&self, client: &str, now: Instant) -> bool {
        let mut windows = self.windows.write().await;

        if windows.len() >= MAX_TRACKED_CLIENTS && !windows.contains_key(client) {
            // Drop fully-elapsed windows before refusing to track new clients.
            windows.retain(|_, times| {
                times.front().is_some_and(|t| now.duration_since(*t) < self.window)
            });
            if windows.len() >= MAX_TRACKED_CLIENTS {
                warn!(client, "rate limiter at capacity, rejecting new client");
                return false;
            }
        }

        let times = windows.entry(client.to_string()).or_default();
        while times
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            times.pop_front();
        }

        if times.len() >= self.limit {
            return false;
        }
        times.push_back(now);
        true
    }
}

/// Derive the rate-limiting key for a request: the client address from
/// forwarding headers, then the socket peer, then a shared fallback.
pub fn client_key(headers: &HeaderMap, conn: Option<&ConnectInfo<SocketAddr>>) -> String {
    if let Some(forwarded) = headers.get("X-Forwarded-For") {
        if let Ok(s) = forwarded.to_str() {
            // First entry in the chain is the original client.
            if let Some(ip) = s.split(',').next().map(str::trim).filter(|p| !p.is_empty()) {
                return ip.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("X-Real-IP").and_then(|v| v.to_str().ok()) {
        return real_ip.trim().to_string();
    }

    conn.map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Create the CORS layer.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(origins)
    }
}

/// Attach a request id, propagating one supplied by the client.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let id = request
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(id.clone());
    let mut response = next.run(request).await;
    if let Ok(value) = id.parse() {
        response.headers_mut().insert("X-Request-ID", value);
    }
    response
}

/// Log each completed request, skipping health probes.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    if uri.path() != "/health" {
        info!(
            method = %method,
            uri = %uri,
            status = %response.status(),
            duration_ms = %start.elapsed().as_millis(),
            "Request completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_plus_one_is_rejected() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("1.2.3.4", now).await);
        assert!(limiter.check_at("1.2.3.4", now).await);
        assert!(limiter.check_at("1.2.3.4", now).await);
        assert!(
            !limiter.check_at("1.2.3.4", now).await,
            "4th request within the window"
        );
    }

    #[tokio::test]
    async fn test_rejection_does_not_record() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check_at("1.2.3.4", start).await);
        // Hammering while limited must not extend the window.
        for i in 1..10 {
            assert!(!limiter.check_at("1.2.3.4", start + Duration::from_secs(i)).await);
        }
        assert!(limiter.check_at("1.2.3.4", start + Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn test_window_elapses() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("1.2.3.4", start).await);
        }
        assert!(!limiter.check_at("1.2.3.4", start + Duration::from_secs(59)).await);
        assert!(limiter.check_at("1.2.3.4", start + Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn test_clients_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("1.2.3.4", now).await);
        assert!(limiter.check_at("5.6.7.8", now).await);
        assert!(!limiter.check_at("1.2.3.4", now).await);
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("X-Real-IP", "198.51.100.2".parse().unwrap());
        assert_eq!(client_key(&headers, None), "203.0.113.7");
    }

    #[test]
    fn test_client_key_falls_back_to_unknown() {
        assert_eq!(client_key(&HeaderMap::new(), None), "unknown");
    }
}
