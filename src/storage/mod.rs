// src/storage/mod.rs

//! 存储层
//!
//! 每个实体一个 trait，SQLite 实现见 [`database::Database`]，
//! 测试里用内存实现替换。

pub mod cache;
pub mod cached_database;
pub mod database;

pub use cache::{CacheServiceConfig, MemoryCache, UserCache};
pub use cached_database::CachedDatabase;
pub use database::Database;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::models::{Comment, FeedItem, FeedQuery, FollowedUser, NewPost, NewUser, Post, Role, User};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// 在同一个事务中创建用户和激活邀请
    async fn create_and_invite(
        &self,
        user: &NewUser,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<User>;
    async fn get_by_id(&self, id: i64) -> AppResult<Option<User>>;
    /// 只返回已激活的用户
    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>>;
    /// 按用户名或邮箱模糊搜索，分页
    async fn list(&self, query: &FeedQuery) -> AppResult<Vec<User>>;
    /// 激活邀请对应的用户，返回用户 id
    async fn activate(&self, token_hash: &str) -> AppResult<i64>;
    async fn set_role(&self, id: i64, role_name: &str) -> AppResult<()>;
    async fn delete(&self, id: i64) -> AppResult<()>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_by_name(&self, name: &str) -> AppResult<Option<Role>>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, post: &NewPost) -> AppResult<Post>;
    async fn get_by_id(&self, id: i64) -> AppResult<Option<Post>>;
    /// 以 `id = post.id AND version = expected_version` 为条件更新，
    /// 成功时 version 加 1 并返回新版本；条件不满足返回 `VersionConflict`
    async fn update(&self, post: &Post, expected_version: i64) -> AppResult<i64>;
    async fn delete(&self, id: i64) -> AppResult<()>;
    async fn feed(&self, user_id: i64, query: &FeedQuery) -> AppResult<Vec<FeedItem>>;
    async fn list_by_user(&self, user_id: i64, query: &FeedQuery) -> AppResult<Vec<FeedItem>>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn create(&self, post_id: i64, user_id: i64, content: &str) -> AppResult<Comment>;
    async fn get_by_id(&self, id: i64) -> AppResult<Option<Comment>>;
    async fn update(&self, id: i64, content: &str) -> AppResult<Comment>;
    async fn delete(&self, id: i64) -> AppResult<()>;
    async fn list_by_post(&self, post_id: i64) -> AppResult<Vec<Comment>>;
}

#[async_trait]
pub trait FollowerStore: Send + Sync {
    async fn follow(&self, follower_id: i64, user_id: i64) -> AppResult<()>;
    async fn unfollow(&self, follower_id: i64, user_id: i64) -> AppResult<()>;
    async fn followed_users(&self, follower_id: i64) -> AppResult<Vec<FollowedUser>>;
}

/// 存储聚合，持有每个实体的存储接口
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
    pub posts: Arc<dyn PostStore>,
    pub comments: Arc<dyn CommentStore>,
    pub followers: Arc<dyn FollowerStore>,
}

impl Storage {
    pub fn sqlite(db: Database) -> Self {
        let db = Arc::new(db);
        Self {
            users: db.clone(),
            roles: db.clone(),
            posts: db.clone(),
            comments: db.clone(),
            followers: db,
        }
    }
}

/// 给一次存储/缓存调用加上超时上限
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let result: AppResult<()> = with_timeout(Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::Timeout)));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_through() {
        let result = with_timeout(Duration::from_secs(5), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);

        let result: AppResult<()> = with_timeout(Duration::from_secs(5), async {
            Err(AppError::NotFound("post".to_string()))
        })
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
