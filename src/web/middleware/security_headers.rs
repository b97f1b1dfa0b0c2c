//! Security headers applied to every response.
//!
//! The backend only serves JSON and uploaded images, so the fallback CSP
//! forbids everything except same-origin images. HSTS is sent when cookies
//! are marked `Secure`, i.e. when the deployment is served over HTTPS.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::response::Response;
use std::task::{Context, Poll};
use tower::{Layer, Service};

static XFO: HeaderValue = HeaderValue::from_static("DENY");
static XCTO: HeaderValue = HeaderValue::from_static("nosniff");
static REFERRER: HeaderValue = HeaderValue::from_static("strict-origin-when-cross-origin");
static CSP: HeaderValue =
    HeaderValue::from_static("default-src 'none'; img-src 'self'; frame-ancestors 'none'");
static HSTS: HeaderValue = HeaderValue::from_static("max-age=31536000; includeSubDomains");

#[derive(Clone)]
pub struct SecurityHeadersLayer {
    hsts: bool,
}

impl SecurityHeadersLayer {
    pub fn new(hsts: bool) -> Self {
        Self { hsts }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersService {
            inner,
            hsts: self.hsts,
        }
    }
}

#[derive(Clone)]
pub struct SecurityHeadersService<S> {
    inner: S,
    hsts: bool,
}

impl<S, B> Service<Request> for SecurityHeadersService<S>
where
    S: Service<Request, Response = Response<B>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Debug,
    B: Send + 'static,
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
        let hsts = self.hsts;
        let future = self.inner.call(req);

        Box::pin(async move {
            let mut response = future.await?;
            let headers = response.headers_mut();

            headers.insert("x-frame-options", XFO.clone());
            headers.insert("x-content-type-options", XCTO.clone());
            headers.insert("referrer-policy", REFERRER.clone());
            if !headers.contains_key("content-security-policy") {
                headers.insert("content-security-policy", CSP.clone());
            }
            if hsts {
                headers.insert("strict-transport-security", HSTS.clone());
            }

            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use std::convert::Infallible;
    use tower::{ServiceExt, service_fn};

    async fn headers_for(hsts: bool, csp: Option<&'static str>) -> axum::http::HeaderMap {
        let inner = service_fn(move |_req: Request| async move {
            let mut resp = Response::new(Body::empty());
            if let Some(csp) = csp {
                resp.headers_mut()
                    .insert("content-security-policy", HeaderValue::from_static(csp));
            }
            Ok::<_, Infallible>(resp)
        });
        let svc = SecurityHeadersLayer::new(hsts).layer(inner);
        let resp = svc
            .oneshot(Request::new(Body::empty()))
            .await
            .unwrap();
        resp.headers().clone()
    }

    #[tokio::test]
    async fn test_hsts_only_when_enabled() {
        let plain = headers_for(false, None).await;
        assert!(plain.get("strict-transport-security").is_none());
        assert_eq!(plain.get("x-frame-options").unwrap(), "DENY");

        let secure = headers_for(true, None).await;
        assert!(secure.get("strict-transport-security").is_some());
    }

    #[tokio::test]
    async fn test_existing_csp_is_kept() {
        let headers = headers_for(false, Some("default-src 'self'")).await;
        assert_eq!(headers.get("content-security-policy").unwrap(), "default-src 'self'");

        let headers = headers_for(false, None).await;
        assert_eq!(headers.get("content-security-policy").unwrap(), &CSP);
    }
}
