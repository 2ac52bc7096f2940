// src/services/mod.rs

//! 业务服务层
//!
//! 这一层封装了所有业务逻辑，与 HTTP 层解耦。
//! 请求身份通过 `RequestContext` 参数显式传入。

pub mod auth_service;
pub mod post_service;
pub mod user_service;
pub mod validator;

pub use auth_service::AuthService;
pub use post_service::{CommentService, PostService};
pub use user_service::UserService;
pub use validator::Validator;

use std::sync::Arc;

use crate::auth::{JwtService, PermissionChecker};
use crate::config::AuthConfig;
use crate::storage::{CachedDatabase, Storage};

/// 服务容器，持有所有业务服务的实例
#[derive(Clone)]
pub struct ServiceContainer {
    pub auth: AuthService,
    pub users: UserService,
    pub posts: PostService,
    pub comments: CommentService,
}

impl ServiceContainer {
    pub fn new(
        storage: &Storage,
        db: CachedDatabase,
        jwt_service: Arc<JwtService>,
        auth_config: &AuthConfig,
    ) -> Self {
        let permissions = PermissionChecker::new(storage.roles.clone());

        let auth = AuthService::new(db.clone(), jwt_service, auth_config);
        let users = UserService::new(
            db,
            storage.followers.clone(),
            storage.posts.clone(),
            permissions.clone(),
        );
        let posts = PostService::new(storage.posts.clone(), permissions.clone());
        let comments = CommentService::new(
            storage.comments.clone(),
            storage.posts.clone(),
            permissions,
        );

        Self {
            auth,
            users,
            posts,
            comments,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::RequestContext;
    use crate::config::Config;
    use crate::storage::database::tests::{create_active_user, create_test_db};
    use crate::storage::{CacheServiceConfig, Database, MemoryCache};
    use std::time::Duration;
    use tempfile::TempDir;

    /// SQLite + 内存缓存组装出的完整服务
    pub(crate) struct TestServices {
        pub services: ServiceContainer,
        pub jwt: Arc<JwtService>,
        pub db: Database,
        _dir: TempDir,
    }

    impl TestServices {
        pub async fn new() -> Self {
            let (db, dir) = create_test_db().await;
            let mut config = Config::default();
            config.auth.bcrypt_cost = 4;

            let storage = Storage::sqlite(db.clone());
            let cached = CachedDatabase::new(
                storage.users.clone(),
                Arc::new(MemoryCache::new(CacheServiceConfig::default())),
                true,
                Duration::from_secs(5),
            );
            let jwt = Arc::new(JwtService::new(&config.auth.token));
            let services = ServiceContainer::new(&storage, cached, jwt.clone(), &config.auth);

            Self {
                services,
                jwt,
                db,
                _dir: dir,
            }
        }

        /// 创建一个已激活用户并包装成请求上下文
        pub async fn context(&self, name: &str, role: &str) -> RequestContext {
            RequestContext {
                principal: create_active_user(&self.db, name, role).await,
                client_key: "127.0.0.1".to_string(),
            }
        }
    }
}
