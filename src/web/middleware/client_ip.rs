//! Client IP resolution from proxy headers.
//!
//! Priority: `CF-Connecting-IP` -> rightmost `X-Forwarded-For` -> socket peer
//! address. Shared by the [`ClientIp`] extractor and the rate limiter.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use std::net::{IpAddr, SocketAddr};

use crate::web::error::ApiError;

/// The resolved client IP address.
pub struct ClientIp(pub IpAddr);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ip) = ip_from_headers(&parts.headers) {
            return Ok(ClientIp(ip));
        }
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(ClientIp(addr.ip()));
        }
        Err(ApiError::internal_error("Unable to determine client IP"))
    }
}

/// Resolve the client IP from proxy headers only.
pub fn ip_from_headers(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(ip) = header_str(headers, "cf-connecting-ip").and_then(|s| s.trim().parse().ok()) {
        return Some(ip);
    }
    // The rightmost entry is the one appended by our own proxy.
    header_str(headers, "x-forwarded-for")
        .and_then(|xff| xff.rsplit(',').next())
        .map(str::trim)
        .and_then(|s| s.parse().ok())
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_priority() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 203.0.113.9"));
        assert_eq!(ip_from_headers(&headers), Some("203.0.113.9".parse().unwrap()));

        headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(ip_from_headers(&headers), Some("198.51.100.4".parse().unwrap()));
    }

    #[test]
    fn test_garbage_headers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        assert_eq!(ip_from_headers(&headers), None);
    }
}
