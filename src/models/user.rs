// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::auth::Password;

/// 角色（只读参考数据）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    /// 数值越大权限越高
    pub level: i64,
    pub description: String,
}

/// 用户（系统中的 principal）
///
/// 密码哈希不参与序列化：API 响应和缓存快照里都不会出现凭据。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub is_active: bool,
    pub role: Role,
    pub created_at: String, // SQLite 使用 TEXT 存储时间
}

/// 用户与角色的联表查询结果 (数据库行)
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: String,
    pub role_id: i64,
    pub role_name: String,
    pub role_level: i64,
    pub role_description: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password: Password::from_hash(row.password_hash),
            is_active: row.is_active,
            role: Role {
                id: row.role_id,
                name: row.role_name,
                level: row.role_level,
                description: row.role_description,
            },
            created_at: row.created_at,
        }
    }
}

/// 新建用户：密码在构造之前就已经哈希完成
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: Password,
    pub role_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct UserWithToken {
    #[serde(flatten)]
    pub user: User,
    /// 激活用的邀请 token（明文只返回这一次）
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// 关注列表中的用户摘要
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FollowedUser {
    pub user_id: i64,
    pub email: String,
    pub username: String,
    pub created_at: String,
}
