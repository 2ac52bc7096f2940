// src/auth/middleware.rs

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::jwt::JwtService;
use super::rate_limit::extract_client_key;
use crate::error::{AppError, AuthError};
use crate::metrics::record_auth_failure;
use crate::models::User;
use crate::storage::CachedDatabase;

#[derive(Clone)]
pub struct AuthState {
    pub jwt_service: Arc<JwtService>,
    pub users: CachedDatabase,
}

/// 当前请求的身份：认证通过的 principal 和客户端地址
///
/// 由认证中间件放进 request extensions，handler 通过提取器显式拿到后
/// 作为参数传给服务层。
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: User,
    pub client_key: String,
}

/// 认证中间件 - 校验 Bearer token 并加载 principal
pub async fn auth_middleware(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let user_id = match auth_state.jwt_service.authenticate(header) {
        Ok(id) => id,
        Err(reason) => {
            record_auth_failure(reason.as_str());
            return Err(AppError::Unauthorized(reason));
        }
    };

    // token 有效但 principal 已不存在：仍然是 401，不暴露用户是否存在
    let principal = match auth_state.users.get_user(user_id).await {
        Ok(user) if user.is_active => user,
        Ok(_) | Err(AppError::NotFound(_)) => {
            record_auth_failure(AuthError::InvalidClaims.as_str());
            return Err(AppError::Unauthorized(AuthError::InvalidClaims));
        }
        Err(e) => return Err(e),
    };

    let context = RequestContext {
        client_key: extract_client_key(&request),
        principal,
    };
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or(AppError::Unauthorized(AuthError::Malformed))
    }
}
