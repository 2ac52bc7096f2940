// src/error.rs

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// 认证失败的具体原因
///
/// 对外统一返回 401 和通用消息，具体原因只进日志和指标。
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization header is malformed")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token claims are invalid")]
    InvalidClaims,

    #[error("invalid credentials")]
    InvalidCredentials,
}

impl AuthError {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthError::Malformed => "malformed",
            AuthError::Expired => "expired",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::InvalidClaims => "invalid_claims",
            AuthError::InvalidCredentials => "invalid_credentials",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("Basic authentication required")]
    BasicAuthRequired,

    #[error("Forbidden")]
    Forbidden,

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Version conflict: expected {expected}, actual {actual:?}")]
    VersionConflict { expected: i64, actual: Option<i64> },

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Retry-After 以秒为单位，向上取整，至少 1 秒
fn retry_after_secs(retry_after: &Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized(reason) => {
                tracing::warn!(reason = reason.as_str(), "Unauthorized request");
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "unauthorized".to_string())
            }
            AppError::BasicAuthRequired => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "unauthorized".to_string())
            }
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", "forbidden".to_string()),
            AppError::RateLimitExceeded { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT",
                format!(
                    "rate limit exceeded, retry after: {}s",
                    retry_after_secs(retry_after)
                ),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::VersionConflict { .. } => (
                StatusCode::CONFLICT,
                "VERSION_CONFLICT",
                "resource was modified concurrently, reload and retry".to_string(),
            ),
            AppError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Timeout => {
                tracing::error!("Upstream operation timed out");
                (StatusCode::INTERNAL_SERVER_ERROR, "TIMEOUT", "The server encountered a problem".to_string())
            }
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "The server encountered a problem".to_string())
            }
            AppError::RoleNotFound(_) | AppError::Cache(_) | AppError::InternalError(_) => {
                tracing::error!("Internal error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "The server encountered a problem".to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        let mut response = (status, body).into_response();

        match &self {
            AppError::BasicAuthRequired => {
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(r#"Basic realm="restricted", charset="UTF-8""#),
                );
            }
            AppError::RateLimitExceeded { retry_after } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(retry_after)));
            }
            _ => {}
        }

        response
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::from(AuthError::Expired).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::VersionConflict { expected: 3, actual: Some(4) }
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::RoleNotFound("ghost".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_basic_auth_challenge_header() {
        let response = AppError::BasicAuthRequired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_some());
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let response = AppError::RateLimitExceeded {
            retry_after: Duration::from_millis(2500),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "3");

        assert_eq!(retry_after_secs(&Duration::ZERO), 1);
    }
}
