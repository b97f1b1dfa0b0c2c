//! Web API router construction.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    response::Response,
    routing::{delete, get, patch, post, put},
};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
};
use tracing::warn;

use crate::state::AppState;
use crate::web::middleware::rate_limit::{RateLimitLayer, SharedRateLimitState};
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::middleware::security_headers::SecurityHeadersLayer;
use crate::web::restaurants::MAX_REVIEW_PHOTOS;
use crate::web::{admin, auth, catalog, crawler, inquiries, me, restaurants, reviews, status};

/// Requests slower than this are cut off with 408, batch routes excepted.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Slack on top of the file bytes for multipart framing and text fields.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

/// Cache-Control presets.
pub mod cache {
    /// Tags, regions and broadcasts change rarely.
    pub const REFERENCE: &str = "public, max-age=300, stale-while-revalidate=300";
    /// Admin endpoints -- never cache.
    pub const ADMIN: &str = "private, no-store, must-revalidate";
}

fn set_cache_control(resp: &mut Response, value: &'static str) {
    resp.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(value));
}

async fn reference_cache(mut resp: Response) -> Response {
    if resp.status().is_success() {
        set_cache_control(&mut resp, cache::REFERENCE);
    }
    resp
}

async fn no_store(mut resp: Response) -> Response {
    set_cache_control(&mut resp, cache::ADMIN);
    resp
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(600))
}

/// Creates the web server router
pub fn create_router(app_state: AppState, rate_limit: SharedRateLimitState) -> Router {
    let public_router = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/restaurants", get(restaurants::list_restaurants))
        .route("/restaurants/{id}", get(restaurants::get_restaurant))
        .route(
            "/restaurants/{id}/reviews",
            get(restaurants::list_restaurant_reviews).post(restaurants::create_review),
        )
        .route(
            "/restaurants/{id}/like",
            post(restaurants::like_restaurant).delete(restaurants::unlike_restaurant),
        )
        .route(
            "/reviews/{id}",
            patch(reviews::update_review).delete(reviews::delete_review),
        )
        .route(
            "/reviews/{id}/like",
            post(reviews::like_review).delete(reviews::unlike_review),
        )
        .route("/inquiries", post(inquiries::create_inquiry))
        .route("/inquiries/{id}", get(inquiries::get_inquiry))
        .with_state(app_state.clone());

    let reference_router = Router::new()
        .route("/tags", get(catalog::list_tags))
        .route("/regions", get(catalog::list_regions))
        .route("/broadcasts", get(catalog::list_broadcasts))
        .route("/broadcasts/{code}/episodes", get(catalog::list_episodes))
        .layer(axum::middleware::map_response(reference_cache))
        .with_state(app_state.clone());

    let auth_router = Router::new()
        .route("/auth/signup", post(auth::handlers::signup))
        .route("/auth/login", post(auth::handlers::login))
        .route("/auth/logout", post(auth::handlers::logout))
        .route("/me", get(me::get_me).patch(me::update_me))
        .route("/me/profile-image", post(me::upload_profile_image))
        .route("/me/reviews", get(me::my_reviews))
        .route("/me/likes", get(me::my_likes))
        .route("/me/inquiries", get(me::my_inquiries))
        .with_state(app_state.clone());

    let admin_router = Router::new()
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}/role", put(admin::set_user_role))
        .route("/admin/users/{id}/active", put(admin::set_user_active))
        .route(
            "/admin/restaurants",
            get(admin::restaurants::list).post(admin::restaurants::create),
        )
        .route(
            "/admin/restaurants/{id}",
            put(admin::restaurants::update).delete(admin::restaurants::delete),
        )
        .route("/admin/restaurants/{id}/tags", put(admin::restaurants::set_tags))
        .route(
            "/admin/restaurants/{id}/photos",
            post(admin::restaurants::add_photos),
        )
        .route(
            "/admin/restaurants/{id}/photos/{photo_id}",
            delete(admin::restaurants::delete_photo),
        )
        .route("/admin/reviews", get(admin::reviews::list))
        .route("/admin/reviews/{id}/hide", post(admin::reviews::hide))
        .route("/admin/reviews/{id}/show", post(admin::reviews::show))
        .route("/admin/inquiries", get(admin::inquiries::list))
        .route("/admin/inquiries/{id}/answer", post(admin::inquiries::answer))
        .route("/admin/inquiries/{id}/close", post(admin::inquiries::close))
        .route("/admin/tags", post(admin::tags::create))
        .route("/admin/tags/{id}", delete(admin::tags::delete))
        .route("/crawler/status", get(crawler::status))
        .layer(axum::middleware::map_response(no_store))
        .with_state(app_state.clone());

    // Long-running admin jobs; these must outlive the request timeout.
    let batch_router = Router::new()
        .route("/crawler/run", post(crawler::run))
        .route("/admin/kakao/sync", post(admin::kakao_sync))
        .route(
            "/admin/aggregates/recompute",
            post(admin::recompute_aggregates),
        )
        .layer(axum::middleware::map_response(no_store))
        .with_state(app_state.clone());

    let api_router = Router::new()
        .merge(public_router)
        .merge(reference_router)
        .merge(auth_router)
        .merge(admin_router)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .merge(batch_router);

    let uploads = app_state.uploads.clone();
    let max_files = MAX_REVIEW_PHOTOS.max(admin::restaurants::MAX_RESTAURANT_PHOTOS);
    let body_limit = app_state.config.max_upload_bytes * max_files + BODY_LIMIT_SLACK;

    let router = Router::new()
        .nest("/api", api_router)
        .nest_service(uploads.url_prefix(), ServeDir::new(uploads.root()));

    router.layer((
        // Outermost: per-request ID span + severity-proportional response logging.
        RequestIdLayer,
        // HSTS only when cookies are marked secure, i.e. behind TLS.
        SecurityHeadersLayer::new(app_state.config.cookie_secure),
        cors_layer(&app_state.config.cors_origin_list()),
        CompressionLayer::new()
            .zstd(true)
            .br(true)
            .gzip(true)
            .quality(tower_http::CompressionLevel::Fastest),
        RateLimitLayer::new(rate_limit),
        DefaultBodyLimit::max(body_limit),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_admin_responses_are_not_cacheable() {
        let resp = no_store(Response::new(axum::body::Body::empty())).await;
        assert_eq!(
            resp.headers().get(header::CACHE_CONTROL).unwrap(),
            cache::ADMIN
        );
    }

    #[tokio::test]
    async fn test_reference_cache_skips_errors() {
        let mut not_found = Response::new(axum::body::Body::empty());
        *not_found.status_mut() = StatusCode::NOT_FOUND;
        let resp = reference_cache(not_found).await;
        assert!(resp.headers().get(header::CACHE_CONTROL).is_none());

        let resp = reference_cache(Response::new(axum::body::Body::empty())).await;
        assert_eq!(
            resp.headers().get(header::CACHE_CONTROL).unwrap(),
            cache::REFERENCE
        );
    }
}
