// src/services/auth_service.rs

use chrono::Utc;
use std::sync::Arc;

use crate::auth::{roles, JwtService, Password};
use crate::config::AuthConfig;
use crate::error::{AppError, AppResult, AuthError};
use crate::models::{LoginRequest, NewUser, RegisterUserRequest, UserWithToken};
use crate::storage::CachedDatabase;
use crate::utils::CryptoUtils;

/// 认证服务
///
/// 注册、激活、登录。注册时密码先哈希，用户和邀请在同一个事务里写入。
#[derive(Clone)]
pub struct AuthService {
    db: CachedDatabase,
    jwt_service: Arc<JwtService>,
    bcrypt_cost: u32,
    invitation_expiry: chrono::Duration,
}

impl AuthService {
    pub fn new(db: CachedDatabase, jwt_service: Arc<JwtService>, config: &AuthConfig) -> Self {
        Self {
            db,
            jwt_service,
            bcrypt_cost: config.bcrypt_cost,
            invitation_expiry: chrono::Duration::hours(config.invitation_expiry_hours),
        }
    }

    /// 注册未激活用户，返回明文邀请码
    pub async fn register(&self, req: RegisterUserRequest) -> AppResult<UserWithToken> {
        let password = Password::hash(&req.password, self.bcrypt_cost)?;

        let new_user = NewUser {
            username: req.username,
            email: req.email,
            password,
            role_name: roles::USER.to_string(),
        };

        let token = CryptoUtils::generate_token();
        let token_hash = CryptoUtils::hash_token(&token);
        let expires_at = Utc::now() + self.invitation_expiry;

        let user = self
            .db
            .inner()
            .create_and_invite(&new_user, &token_hash, expires_at)
            .await?;

        tracing::info!(user_id = user.id, "User registered");
        Ok(UserWithToken { user, token })
    }

    pub async fn activate(&self, token: &str) -> AppResult<i64> {
        let user_id = self.db.activate(&CryptoUtils::hash_token(token)).await?;
        tracing::info!(user_id, "User activated");
        Ok(user_id)
    }

    /// 邮箱不存在、未激活、密码错误都返回同一个 401
    pub async fn login(&self, req: LoginRequest) -> AppResult<String> {
        let user = self
            .db
            .inner()
            .get_by_email(&req.email)
            .await?
            .ok_or(AppError::Unauthorized(AuthError::InvalidCredentials))?;

        if !user.password.compare(&req.password) {
            return Err(AppError::Unauthorized(AuthError::InvalidCredentials));
        }

        self.jwt_service.generate_token(user.id)
    }
}
