//! Rate limiting middleware using a sliding window algorithm.
//!
//! Each (client IP, tier) pair gets a bucket of tokens that refills over the
//! configured window. Requests over the limit are answered with 429 before
//! they reach any handler.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::AppState;

use super::error::ApiError;

/// Rate limit tier for different endpoint types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Contact and user endpoints
    Api,
    /// Signup, login, refresh and confirmation endpoints
    Auth,
}

/// Entry in the rate limit tracker
#[derive(Debug, Clone)]
struct RateLimitEntry {
    /// Tokens remaining in the current window
    tokens: u32,
    /// Start of the current window
    window_start: Instant,
    /// Last request time (for sliding window)
    last_request: Instant,
}

impl RateLimitEntry {
    fn new(max_tokens: u32, now: Instant) -> Self {
        Self {
            tokens: max_tokens,
            window_start: now,
            last_request: now,
        }
    }
}

/// Thread-safe rate limiter using dashmap
#[derive(Debug)]
pub struct RateLimiter {
    /// Map of (IP, Tier) -> RateLimitEntry
    entries: DashMap<(IpAddr, RateLimitTier), RateLimitEntry>,
    config: RateLimitConfig,
    window_duration: Duration,
}

/// Information about rate limit status
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Maximum requests per window
    pub limit: u32,
    /// Seconds until the window resets
    pub reset_after: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            window_duration: Duration::from_secs(config.window_seconds),
            config,
        }
    }

    /// Check if a request should be allowed and consume a token if so.
    /// Returns Ok(info) if allowed, Err(retry_after_seconds) if rate limited.
    pub fn check_rate_limit(&self, ip: IpAddr, tier: RateLimitTier) -> Result<RateLimitInfo, u64> {
        self.check_rate_limit_at(ip, tier, Instant::now())
    }

    fn check_rate_limit_at(
        &self,
        ip: IpAddr,
        tier: RateLimitTier,
        now: Instant,
    ) -> Result<RateLimitInfo, u64> {
        if !self.config.enabled {
            return Ok(RateLimitInfo {
                remaining: u32::MAX,
                limit: u32::MAX,
                reset_after: 0,
            });
        }

        let max_tokens = self.max_tokens(tier);

        let mut entry = self
            .entries
            .entry((ip, tier))
            .or_insert_with(|| RateLimitEntry::new(max_tokens, now));

        let elapsed = now.saturating_duration_since(entry.window_start);
        if elapsed >= self.window_duration {
            entry.tokens = max_tokens;
            entry.window_start = now;
        } else {
            // Gradually replenish tokens based on time since the last request
            let since_last = now.saturating_duration_since(entry.last_request);
            let replenish_rate = max_tokens as f64 / self.window_duration.as_secs_f64();
            let replenished = (since_last.as_secs_f64() * replenish_rate) as u32;
            entry.tokens = entry.tokens.saturating_add(replenished).min(max_tokens);
        }

        entry.last_request = now;
        let elapsed = now.saturating_duration_since(entry.window_start);

        if entry.tokens > 0 {
            entry.tokens -= 1;
            Ok(RateLimitInfo {
                remaining: entry.tokens,
                limit: max_tokens,
                reset_after: self.window_duration.saturating_sub(elapsed).as_secs(),
            })
        } else {
            Err(self.window_duration.saturating_sub(elapsed).as_secs().max(1))
        }
    }

    fn max_tokens(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
        }
    }

    /// Clean up expired entries to prevent unbounded growth
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let expiry = self.window_duration * 2;

        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.window_start) < expiry);
    }

    /// Number of tracked (IP, tier) pairs
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

fn socket_ip(request: &Request<Body>) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

fn forwarded_ip(request: &Request<Body>) -> Option<IpAddr> {
    // X-Forwarded-For: take the first IP in the list (original client)
    if let Some(ip) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return Some(ip);
    }

    request
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
}

/// Client address used as the limiter key.
///
/// Forwarded headers are client-controlled, so they are only consulted when
/// the service is configured to sit behind a proxy that sets them.
fn extract_client_ip(request: &Request<Body>, trust_proxy_headers: bool) -> IpAddr {
    let forwarded = if trust_proxy_headers {
        forwarded_ip(request)
    } else {
        None
    };

    forwarded
        .or_else(|| socket_ip(request))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Rate limiting middleware for contact and user endpoints
pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    rate_limit_with_tier(state, request, next, RateLimitTier::Api).await
}

/// Rate limiting middleware for auth endpoints
pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    rate_limit_with_tier(state, request, next, RateLimitTier::Auth).await
}

async fn rate_limit_with_tier(
    state: Arc<AppState>,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Response {
    let ip = extract_client_ip(&request, state.config.rate_limit.trust_proxy_headers);

    match state.rate_limiter.check_rate_limit(ip, tier) {
        Ok(info) => {
            let mut response = next.run(request).await;

            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", HeaderValue::from(info.limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(info.remaining));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(info.reset_after));

            response
        }
        Err(retry_after) => {
            tracing::debug!(%ip, ?tier, "Rate limit exceeded");

            let mut response = ApiError::rate_limited(format!(
                "Rate limit exceeded. Try again in {} seconds.",
                retry_after
            ))
            .into_response();

            let headers = response.headers_mut();
            headers.insert("Retry-After", HeaderValue::from(retry_after));
            headers.insert(
                "X-RateLimit-Limit",
                HeaderValue::from(state.rate_limiter.max_tokens(tier)),
            );
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(retry_after));

            response
        }
    }
}

/// Spawn a background task to periodically clean up expired rate limit entries
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(cleanup_interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            rate_limiter.cleanup_expired();
            tracing::debug!(
                "Rate limiter cleanup complete, {} entries remaining",
                rate_limiter.entry_count()
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            api_requests_per_window: 10,
            auth_requests_per_window: 5,
            window_seconds: 60,
            cleanup_interval: 300,
            trust_proxy_headers: false,
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_rate_limiter_allows_requests_under_limit() {
        let limiter = RateLimiter::new(test_config());
        let now = Instant::now();

        for i in 0..10 {
            let result = limiter.check_rate_limit_at(ip("192.168.1.1"), RateLimitTier::Api, now);
            assert!(result.is_ok(), "Request {} should be allowed", i);
        }
    }

    #[test]
    fn test_rate_limiter_blocks_after_limit() {
        let limiter = RateLimiter::new(test_config());
        let now = Instant::now();

        for _ in 0..10 {
            let _ = limiter.check_rate_limit_at(ip("192.168.1.1"), RateLimitTier::Api, now);
        }

        let result = limiter.check_rate_limit_at(ip("192.168.1.1"), RateLimitTier::Api, now);
        assert!(result.is_err(), "Request should be rate limited");
        assert!(result.unwrap_err() >= 1);
    }

    #[test]
    fn test_window_reset_restores_tokens() {
        let limiter = RateLimiter::new(test_config());
        let start = Instant::now();

        for _ in 0..10 {
            let _ = limiter.check_rate_limit_at(ip("192.168.1.1"), RateLimitTier::Api, start);
        }
        assert!(limiter
            .check_rate_limit_at(ip("192.168.1.1"), RateLimitTier::Api, start)
            .is_err());

        let later = start + Duration::from_secs(61);
        let info = limiter
            .check_rate_limit_at(ip("192.168.1.1"), RateLimitTier::Api, later)
            .unwrap();
        assert_eq!(info.remaining, 9);
    }

    #[test]
    fn test_different_ips_have_separate_limits() {
        let limiter = RateLimiter::new(test_config());
        let now = Instant::now();

        for _ in 0..10 {
            let _ = limiter.check_rate_limit_at(ip("192.168.1.1"), RateLimitTier::Api, now);
        }

        let result = limiter.check_rate_limit_at(ip("192.168.1.2"), RateLimitTier::Api, now);
        assert!(result.is_ok(), "Different IP should have its own limit");
    }

    #[test]
    fn test_different_tiers_have_different_limits() {
        let limiter = RateLimiter::new(test_config());
        let now = Instant::now();

        for _ in 0..5 {
            let _ = limiter.check_rate_limit_at(ip("192.168.1.1"), RateLimitTier::Auth, now);
        }

        assert!(
            limiter
                .check_rate_limit_at(ip("192.168.1.1"), RateLimitTier::Auth, now)
                .is_err(),
            "Auth should be rate limited"
        );
        assert!(
            limiter
                .check_rate_limit_at(ip("192.168.1.1"), RateLimitTier::Api, now)
                .is_ok(),
            "API should still be allowed"
        );
    }

    #[test]
    fn test_disabled_rate_limiting() {
        let mut config = test_config();
        config.enabled = false;
        let limiter = RateLimiter::new(config);

        for _ in 0..100 {
            let result = limiter.check_rate_limit(ip("192.168.1.1"), RateLimitTier::Api);
            assert!(result.is_ok(), "All requests should be allowed when disabled");
        }
        assert_eq!(limiter.entry_count(), 0);
    }

    fn request_from(peer: &str, forwarded_for: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/contacts");
        if let Some(value) = forwarded_for {
            builder = builder
                .header("x-forwarded-for", value)
                .header("x-real-ip", value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        request
    }

    #[test]
    fn test_forwarded_headers_ignored_by_default() {
        let request = request_from("203.0.113.7:50000", Some("10.0.0.1"));
        assert_eq!(extract_client_ip(&request, false), ip("203.0.113.7"));
    }

    #[test]
    fn test_forwarded_headers_used_when_trusted() {
        let request = request_from("127.0.0.1:50000", Some("10.0.0.1, 172.16.0.1"));
        assert_eq!(extract_client_ip(&request, true), ip("10.0.0.1"));

        // Unparseable header falls back to the peer address
        let request = request_from("127.0.0.1:50000", Some("not-an-ip"));
        assert_eq!(extract_client_ip(&request, true), ip("127.0.0.1"));
    }

    #[test]
    fn test_missing_connect_info_falls_back_to_loopback() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_client_ip(&request, false), ip("127.0.0.1"));
    }

    #[test]
    fn test_cleanup_keeps_recent_entries() {
        let limiter = RateLimiter::new(test_config());

        let _ = limiter.check_rate_limit(ip("192.168.1.1"), RateLimitTier::Api);
        assert_eq!(limiter.entry_count(), 1);

        limiter.cleanup_expired();
        assert_eq!(limiter.entry_count(), 1);
    }
}
