// src/auth/basic.rs

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use base64::Engine as _;
use std::sync::Arc;

use crate::config::BasicAuthConfig;
use crate::error::{AppError, AppResult};
use crate::metrics::record_auth_failure;

/// 校验 `Authorization: Basic <base64(user:pass)>`
pub fn verify_basic(header: Option<&str>, config: &BasicAuthConfig) -> AppResult<()> {
    let header = header.ok_or(AppError::BasicAuthRequired)?;

    let parts: Vec<&str> = header.split(' ').collect();
    let encoded = match parts.as_slice() {
        ["Basic", encoded] => *encoded,
        _ => return Err(AppError::BasicAuthRequired),
    };

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| AppError::BasicAuthRequired)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AppError::BasicAuthRequired)?;

    match decoded.split_once(':') {
        Some((user, pass)) if user == config.user && pass == config.pass => Ok(()),
        _ => Err(AppError::BasicAuthRequired),
    }
}

/// Basic 认证中间件（调试/管理端点）
pub async fn basic_auth_middleware(
    State(config): State<Arc<BasicAuthConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = verify_basic(header, &config) {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Basic authentication rejected"
        );
        record_auth_failure("basic");
        return Err(e);
    }

    Ok(next.run(request).await)
}
