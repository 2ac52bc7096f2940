// src/services/user_service.rs

use std::sync::Arc;

use crate::auth::{roles, PermissionChecker, RequestContext};
use crate::error::{AppError, AppResult};
use crate::models::{FeedItem, FeedQuery, FollowedUser, User};
use crate::storage::{CachedDatabase, FollowerStore, PostStore};

/// 用户服务
///
/// 用户读取走缓存；改角色、删除通过 `CachedDatabase` 写入并使缓存失效。
#[derive(Clone)]
pub struct UserService {
    db: CachedDatabase,
    followers: Arc<dyn FollowerStore>,
    posts: Arc<dyn PostStore>,
    permissions: PermissionChecker,
}

impl UserService {
    pub fn new(
        db: CachedDatabase,
        followers: Arc<dyn FollowerStore>,
        posts: Arc<dyn PostStore>,
        permissions: PermissionChecker,
    ) -> Self {
        Self {
            db,
            followers,
            posts,
            permissions,
        }
    }

    pub async fn get(&self, id: i64) -> AppResult<User> {
        self.db.get_user(id).await
    }

    /// 用户目录，按用户名或邮箱搜索
    pub async fn list(&self, query: &FeedQuery) -> AppResult<Vec<User>> {
        self.db.inner().list(query).await
    }

    pub async fn follow(&self, ctx: &RequestContext, user_id: i64) -> AppResult<()> {
        if ctx.principal.id == user_id {
            return Err(AppError::ValidationError("cannot follow yourself".to_string()));
        }
        self.followers.follow(ctx.principal.id, user_id).await
    }

    pub async fn unfollow(&self, ctx: &RequestContext, user_id: i64) -> AppResult<()> {
        self.followers.unfollow(ctx.principal.id, user_id).await
    }

    pub async fn followed(&self, ctx: &RequestContext) -> AppResult<Vec<FollowedUser>> {
        self.followers.followed_users(ctx.principal.id).await
    }

    /// 自己和关注用户的帖子
    pub async fn feed(&self, ctx: &RequestContext, query: &FeedQuery) -> AppResult<Vec<FeedItem>> {
        self.posts.feed(ctx.principal.id, query).await
    }

    pub async fn posts(&self, user_id: i64, query: &FeedQuery) -> AppResult<Vec<FeedItem>> {
        // 用户不存在时返回 404 而不是空列表
        self.get(user_id).await?;
        self.posts.list_by_user(user_id, query).await
    }

    /// 只有 admin 可以改角色，包括自己的
    pub async fn set_role(&self, ctx: &RequestContext, user_id: i64, role: &str) -> AppResult<User> {
        self.permissions
            .require_role(&ctx.principal, roles::ADMIN)
            .await?;

        // 目标角色来自请求体，不存在属于客户端输入错误
        self.db.set_role(user_id, role).await.map_err(|e| match e {
            AppError::RoleNotFound(name) => {
                AppError::ValidationError(format!("unknown role: {}", name))
            }
            other => other,
        })?;

        tracing::info!(user_id, role, by = ctx.principal.id, "User role changed");
        self.get(user_id).await
    }

    /// 本人或 admin 可以删除
    pub async fn delete(&self, ctx: &RequestContext, user_id: i64) -> AppResult<()> {
        self.permissions
            .authorize(&ctx.principal, user_id, roles::ADMIN)
            .await?;
        self.db.delete_user(user_id).await?;

        tracing::info!(user_id, by = ctx.principal.id, "User deleted");
        Ok(())
    }
}
