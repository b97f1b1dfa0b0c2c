//! Inbound HTTP rate limiting with per-IP token buckets.
//!
//! Two layers are evaluated for every request (first rejection wins):
//!
//! 1. **Global per-IP** -- burst (5s) + sustained (1min)
//! 2. **Route group** -- budgets for credential endpoints, writes, admin
//!    calls and plain reads
//!
//! Health checks and static uploads only count against the global layer.

use crate::web::middleware::client_ip::ip_from_headers;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::Response;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter, clock::Clock};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RouteGroup {
    /// Login and signup: guessing passwords or mass-creating accounts.
    Credentials,
    /// Mutating requests from regular users (reviews, likes, inquiries).
    Write,
    Admin,
    Read,
    /// Health checks and static files.
    Internal,
}

fn classify_route(method: &Method, path: &str) -> RouteGroup {
    if path == "/api/auth/login" || path == "/api/auth/signup" {
        RouteGroup::Credentials
    } else if path.starts_with("/api/admin/") || path.starts_with("/api/crawler/") {
        RouteGroup::Admin
    } else if path == "/api/health" || path == "/api/status" || !path.starts_with("/api/") {
        RouteGroup::Internal
    } else if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
        RouteGroup::Read
    } else {
        RouteGroup::Write
    }
}

/// Keyed rate limiters for every layer.
pub struct RateLimitState {
    global_burst: DefaultKeyedRateLimiter<IpAddr>,
    global_sustained: DefaultKeyedRateLimiter<IpAddr>,

    credentials_burst: DefaultKeyedRateLimiter<IpAddr>,
    credentials_long: DefaultKeyedRateLimiter<IpAddr>,
    write_burst: DefaultKeyedRateLimiter<IpAddr>,
    write_sustained: DefaultKeyedRateLimiter<IpAddr>,
    admin_sustained: DefaultKeyedRateLimiter<IpAddr>,
    read_sustained: DefaultKeyedRateLimiter<IpAddr>,
}

/// `count` requests per `period`, with burst = count.
fn quota(count: u32, period: Duration) -> Quota {
    let burst = NonZeroU32::new(count).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(period / burst.get())
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitState {
    pub fn new() -> Self {
        Self {
            global_burst: RateLimiter::keyed(quota(30, Duration::from_secs(5))),
            global_sustained: RateLimiter::keyed(quota(240, Duration::from_secs(60))),

            credentials_burst: RateLimiter::keyed(quota(5, Duration::from_secs(60))),
            credentials_long: RateLimiter::keyed(quota(30, Duration::from_secs(60 * 60))),
            write_burst: RateLimiter::keyed(quota(5, Duration::from_secs(5))),
            write_sustained: RateLimiter::keyed(quota(30, Duration::from_secs(60))),
            admin_sustained: RateLimiter::keyed(quota(120, Duration::from_secs(60))),
            read_sustained: RateLimiter::keyed(quota(120, Duration::from_secs(60))),
        }
    }

    fn limiters_for(&self, group: RouteGroup) -> Vec<&DefaultKeyedRateLimiter<IpAddr>> {
        match group {
            RouteGroup::Credentials => vec![&self.credentials_burst, &self.credentials_long],
            RouteGroup::Write => vec![&self.write_burst, &self.write_sustained],
            RouteGroup::Admin => vec![&self.admin_sustained],
            RouteGroup::Read => vec![&self.read_sustained],
            RouteGroup::Internal => Vec::new(),
        }
    }

    /// Check every applicable limiter. Returns `Err(retry_after_secs)` with
    /// the longest wait when any of them rejects.
    fn check(&self, ip: IpAddr, method: &Method, path: &str) -> Result<(), u64> {
        let now = governor::clock::DefaultClock::default().now();
        let mut max_wait: Option<Duration> = None;

        let group = classify_route(method, path);
        let limiters = [&self.global_burst, &self.global_sustained]
            .into_iter()
            .chain(self.limiters_for(group));

        for limiter in limiters {
            if let Err(not_until) = limiter.check_key(&ip) {
                let wait = not_until.wait_time_from(now);
                if wait > max_wait.unwrap_or(Duration::ZERO) {
                    max_wait = Some(wait);
                }
                max_wait.get_or_insert(Duration::ZERO);
            }
        }

        match max_wait {
            Some(wait) => Err(wait.as_secs().max(1)),
            None => Ok(()),
        }
    }

    /// Drop idle buckets so memory stays bounded by active clients.
    pub fn retain_recent(&self) {
        for limiter in [
            &self.global_burst,
            &self.global_sustained,
            &self.credentials_burst,
            &self.credentials_long,
            &self.write_burst,
            &self.write_sustained,
            &self.admin_sustained,
            &self.read_sustained,
        ] {
            limiter.retain_recent();
        }
    }
}

pub type SharedRateLimitState = Arc<RateLimitState>;

#[derive(Clone)]
pub struct RateLimitLayer {
    state: SharedRateLimitState,
}

impl RateLimitLayer {
    pub fn new(state: SharedRateLimitState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    state: SharedRateLimitState,
}

impl<S, ResBody> Service<Request> for RateLimitService<S>
where
    S: Service<Request, Response = Response<ResBody>> + Send + Clone + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Debug + Send,
    ResBody: Send + 'static,
    Body: Into<ResBody>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let client_ip = ip_from_headers(req.headers()).or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        });

        let Some(ip) = client_ip else {
            return Box::pin(self.inner.call(req));
        };

        match self.state.check(ip, req.method(), req.uri().path()) {
            Ok(()) => Box::pin(self.inner.call(req)),
            Err(retry_after) => {
                warn!(
                    client_ip = %ip,
                    method = %req.method(),
                    path = %req.uri().path(),
                    retry_after_secs = retry_after,
                    "Rate limit exceeded"
                );
                let resp = rate_limit_response(retry_after).map(Into::into);
                Box::pin(async move { Ok(resp) })
            }
        }
    }
}

fn rate_limit_response(retry_after: u64) -> Response<Body> {
    let body = serde_json::json!({
        "code": "RATE_LIMITED",
        "message": format!("Too many requests. Retry after {retry_after} seconds."),
    });
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response
        .headers_mut()
        .insert("content-type", HeaderValue::from_static("application/json"));
    response
        .headers_mut()
        .insert("retry-after", HeaderValue::from(retry_after));
    response
}
