// src/storage/cache.rs

use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use std::time::Duration;

use crate::config::CacheConfig;
use crate::error::{AppError, AppResult};
use crate::models::User;

/// 缓存键前缀
mod keys {
    pub const USER_BY_ID: &str = "user:id:";
}

fn user_key(id: i64) -> String {
    format!("{}{}", keys::USER_BY_ID, id)
}

/// 用户缓存接口
///
/// 失败返回 `AppError::Cache`，由调用方决定是降级还是上报。
#[async_trait]
pub trait UserCache: Send + Sync {
    async fn get(&self, id: i64) -> AppResult<Option<User>>;
    async fn set(&self, user: &User) -> AppResult<()>;
    async fn delete(&self, id: i64) -> AppResult<()>;
}

/// 缓存配置
#[derive(Clone)]
pub struct CacheServiceConfig {
    /// 最大缓存条目数
    pub max_capacity: u64,
    pub time_to_live: Duration,
}

impl Default for CacheServiceConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_live: Duration::from_secs(60),
        }
    }
}

impl From<&CacheConfig> for CacheServiceConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_capacity: config.max_capacity,
            time_to_live: Duration::from_secs(config.ttl_secs),
        }
    }
}

/// 进程内缓存，值为序列化后的用户快照（不含密码哈希）
pub struct MemoryCache {
    cache: Cache<String, Bytes>,
}

impl MemoryCache {
    pub fn new(config: CacheServiceConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.time_to_live)
            .build();

        Self { cache }
    }
}

#[async_trait]
impl UserCache for MemoryCache {
    async fn get(&self, id: i64) -> AppResult<Option<User>> {
        match self.cache.get(&user_key(id)).await {
            Some(data) => {
                let user = serde_json::from_slice(&data)
                    .map_err(|e| AppError::Cache(format!("corrupt user entry: {}", e)))?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, user: &User) -> AppResult<()> {
        let data = serde_json::to_vec(user)
            .map_err(|e| AppError::Cache(format!("failed to encode user: {}", e)))?;
        self.cache.insert(user_key(user.id), Bytes::from(data)).await;
        Ok(())
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        self.cache.invalidate(&user_key(id)).await;
        Ok(())
    }
}
