//! Standardized API error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use ts_rs::TS;

use crate::crawler::CrawlError;
use crate::data::reviews::ReviewError;
use crate::kakao::KakaoError;
use crate::uploads::UploadError;

/// Machine-readable error code sent in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ApiErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    PayloadTooLarge,
    UnsupportedMediaType,
    RateLimited,
    ServiceUnavailable,
    InternalError,
}

impl ApiErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional, type = "Record<string, unknown>")]
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Conflict, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::ServiceUnavailable, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

/// Log a database (or other internal) failure and hide it behind a generic 500.
pub fn db_error(context: &str, error: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %error, "{context} failed");
    ApiError::internal_error(format!("{context} failed"))
}

/// Whether an error chain contains a Postgres unique-constraint violation.
pub fn is_unique_violation(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    })
}

/// Turn `Option::None` into a 404 naming the missing resource.
pub trait OptionNotFoundExt<T> {
    fn or_not_found(self, resource: &str, id: impl std::fmt::Display) -> Result<T, ApiError>;
}

impl<T> OptionNotFoundExt<T> for Option<T> {
    fn or_not_found(self, resource: &str, id: impl std::fmt::Display) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::not_found(format!("{resource} {id} not found")))
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::NotFound => ApiError::not_found("Review not found"),
            ReviewError::RestaurantNotFound => ApiError::not_found("Restaurant not found"),
            ReviewError::Forbidden => {
                ApiError::forbidden("Only the author or an admin can modify this review")
            }
            ReviewError::Invalid(msg) => ApiError::bad_request(msg),
            ReviewError::Database(e) => db_error("Review update", e),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::UnsupportedType(_) => {
                ApiError::new(ApiErrorCode::UnsupportedMediaType, err.to_string())
            }
            UploadError::TooLarge { .. } => {
                ApiError::new(ApiErrorCode::PayloadTooLarge, err.to_string())
            }
            UploadError::Empty | UploadError::TooMany(_) | UploadError::Multipart(_) => {
                ApiError::bad_request(err.to_string())
            }
            UploadError::Io(e) => db_error("Storing upload", e),
        }
    }
}

impl From<CrawlError> for ApiError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::UnknownBroadcast(_) => ApiError::not_found(err.to_string()),
            CrawlError::NoScraper(_) | CrawlError::InvalidRange { .. } => {
                ApiError::bad_request(err.to_string())
            }
            CrawlError::AlreadyRunning => ApiError::conflict(err.to_string()),
            CrawlError::Database(e) => db_error("Crawl", e),
            other => {
                tracing::warn!(error = %other, "crawl aborted before the episode loop");
                ApiError::new(ApiErrorCode::ServiceUnavailable, other.to_string())
            }
        }
    }
}

impl From<KakaoError> for ApiError {
    fn from(err: KakaoError) -> Self {
        match err {
            KakaoError::NotConfigured => ApiError::service_unavailable(err.to_string()),
            KakaoError::Database(e) => db_error("Kakao sync", e),
            other => {
                tracing::warn!(error = %other, "Kakao API request failed");
                ApiError::service_unavailable(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_value(ApiError::not_found("Review 3 not found")).unwrap();
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["message"], "Review 3 not found");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiErrorCode::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        let err: ApiError = ReviewError::Invalid("rating must be between 1 and 5".into()).into();
        assert_eq!(err.code, ApiErrorCode::BadRequest);
        let err: ApiError = UploadError::TooLarge { limit: 10 }.into();
        assert_eq!(err.into_response().status(), StatusCode::PAYLOAD_TOO_LARGE);
        let err: ApiError = CrawlError::AlreadyRunning.into();
        assert_eq!(err.code, ApiErrorCode::Conflict);
    }

    #[test]
    fn test_or_not_found() {
        let missing: Option<i32> = None;
        let err = missing.or_not_found("Restaurant", 9).unwrap_err();
        assert_eq!(err.code, ApiErrorCode::NotFound);
        assert_eq!(err.message, "Restaurant 9 not found");
    }

    #[test]
    fn test_plain_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&anyhow::anyhow!("duplicate name")));
        let wrapped = anyhow::Error::from(sqlx::Error::RowNotFound).context("lookup");
        assert!(!is_unique_violation(&wrapped));
    }
}
