//! Per-client token-bucket rate limiting

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::RwLock;

use crate::error::ApiError;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn take(&mut self, refill_per_second: f64, capacity: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_second).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared bucket table keyed by client address
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<RwLock<HashMap<String, TokenBucket>>>,
    refill_per_second: f64,
    capacity: f64,
    trust_forwarded: bool,
}

impl RateLimiter {
    /// `requests_per_second` sustained, bursts up to twice that
    pub fn new(requests_per_second: u32) -> Self {
        let rps = f64::from(requests_per_second.max(1));
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            refill_per_second: rps,
            capacity: rps * 2.0,
            trust_forwarded: false,
        }
    }

    /// Key clients on `x-forwarded-for`/`x-real-ip`; only safe behind a proxy
    /// that overwrites them
    pub fn trusting_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    pub async fn check(&self, client: &str) -> bool {
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket::full(self.capacity))
            .take(self.refill_per_second, self.capacity)
    }

    /// Drop buckets idle for longer than `max_idle`; returns how many went
    pub async fn prune(&self, max_idle: Duration) -> usize {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_refill) < max_idle);
        before - buckets.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.buckets.read().await.len()
    }
}

/// Middleware: use with `axum::middleware::from_fn_with_state`
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(&request, limiter.trust_forwarded);

    if !limiter.check(&client).await {
        tracing::warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
        let mut response = ApiError::TooManyRequests.into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, header::HeaderValue::from_static("1"));
        return response;
    }

    next.run(request).await
}

/// Peer address of the connection. Forwarded headers win only when trusted.
pub fn client_key(request: &Request, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let headers = request.headers();
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .or_else(|| headers.get("x-real-ip").and_then(|h| h.to_str().ok()))
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(client) = forwarded {
            return client.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
