// src/storage/cached_database.rs

use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::metrics::record_cache_lookup;
use crate::models::User;

use super::{with_timeout, UserCache, UserStore};

/// 带缓存的用户访问层（cache-aside）
///
/// 读：先查缓存，未命中再查存储并回填。
/// 写：影响用户快照的写操作（激活、改角色、删除）在存储写成功后、
/// 返回之前删除缓存条目。删除失败的 id 记入 `stale`，之后的读取绕过缓存，
/// 直到用新快照覆盖成功为止。
#[derive(Clone)]
pub struct CachedDatabase {
    users: Arc<dyn UserStore>,
    cache: Arc<dyn UserCache>,
    stale: Arc<DashSet<i64>>,
    enabled: bool,
    timeout: Duration,
}

impl CachedDatabase {
    pub fn new(
        users: Arc<dyn UserStore>,
        cache: Arc<dyn UserCache>,
        enabled: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            users,
            cache,
            stale: Arc::new(DashSet::new()),
            enabled,
            timeout,
        }
    }

    /// 获取原始存储（用于不需要缓存的操作）
    pub fn inner(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    // ==================== 读 ====================

    pub async fn get_user(&self, id: i64) -> AppResult<User> {
        if !self.enabled {
            return self.load_user(id).await;
        }

        let stale = self.stale.contains(&id);

        // 先查缓存；缓存不可用时降级到存储。失效失败过的条目不可信，直接读存储
        if stale {
            record_cache_lookup("stale");
        } else {
            match with_timeout(self.timeout, self.cache.get(id)).await {
                Ok(Some(user)) => {
                    record_cache_lookup("hit");
                    return Ok(user);
                }
                Ok(None) => record_cache_lookup("miss"),
                Err(e) => {
                    record_cache_lookup("error");
                    tracing::warn!(user_id = id, error = %e, "Cache read failed, falling back to store");
                }
            }
        }

        let user = match self.load_user(id).await {
            Ok(user) => user,
            Err(AppError::NotFound(msg)) if stale => {
                // 用户已删除：旧条目必须删掉才能解除标记
                if with_timeout(self.timeout, self.cache.delete(id)).await.is_ok() {
                    self.stale.remove(&id);
                }
                return Err(AppError::NotFound(msg));
            }
            Err(e) => return Err(e),
        };

        // 回填失败只记录，不影响本次读取
        match with_timeout(self.timeout, self.cache.set(&user)).await {
            Ok(()) => {
                if stale {
                    self.stale.remove(&id);
                }
            }
            Err(e) => tracing::warn!(user_id = id, error = %e, "Cache populate failed"),
        }

        Ok(user)
    }

    async fn load_user(&self, id: i64) -> AppResult<User> {
        self.users
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".to_string()))
    }

    // ==================== 写（失效） ====================

    pub async fn activate(&self, token_hash: &str) -> AppResult<i64> {
        let user_id = self.users.activate(token_hash).await?;
        self.invalidate(user_id).await?;
        Ok(user_id)
    }

    pub async fn set_role(&self, id: i64, role_name: &str) -> AppResult<()> {
        self.users.set_role(id, role_name).await?;
        self.invalidate(id).await
    }

    pub async fn delete_user(&self, id: i64) -> AppResult<()> {
        self.users.delete(id).await?;
        self.invalidate(id).await
    }

    /// 删除缓存条目；失败时上报并把 id 标记为 stale，之后的读取不再信任缓存
    async fn invalidate(&self, id: i64) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }

        with_timeout(self.timeout, self.cache.delete(id))
            .await
            .map_err(|e| {
                self.stale.insert(id);
                tracing::error!(user_id = id, error = %e, "Cache invalidation failed");
                match e {
                    AppError::Cache(msg) => AppError::Cache(msg),
                    other => AppError::Cache(other.to_string()),
                }
            })
    }
}
