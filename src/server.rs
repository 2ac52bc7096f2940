// src/server.rs

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{
    auth_middleware, basic_auth_middleware, rate_limit_middleware, AuthState, JwtService,
    RateLimitConfig, RateLimitState, RateLimiter,
};
use crate::config::Config;
use crate::error::AppResult;
use crate::handlers::{health, rest};
use crate::metrics::{init_metrics, metrics_handler, metrics_middleware};
use crate::services::{ServiceContainer, Validator};
use crate::storage::{CacheServiceConfig, CachedDatabase, Database, MemoryCache, Storage};

/// HTTP 服务器
pub struct Server {
    config: Arc<Config>,
    router: Router,
}

impl Server {
    pub async fn new(config: Arc<Config>, db: Database) -> AppResult<Self> {
        init_metrics();

        tracing::info!("Initializing server v{}", env!("CARGO_PKG_VERSION"));

        let storage = Storage::sqlite(db);

        // 用户缓存
        let cache = Arc::new(MemoryCache::new(CacheServiceConfig::from(&config.cache)));
        let cached_db = CachedDatabase::new(
            storage.users.clone(),
            cache,
            config.cache.enabled,
            config.database.query_timeout(),
        );
        tracing::info!(enabled = config.cache.enabled, "User cache initialized");

        // 初始化速率限制
        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::from(&config.rate_limiter)));
        if config.rate_limiter.enabled {
            rate_limiter.clone().start_cleanup_task();
        }
        tracing::info!(
            enabled = config.rate_limiter.enabled,
            requests_per_window = config.rate_limiter.requests_per_window,
            window_secs = config.rate_limiter.window_secs,
            "Rate limiter initialized"
        );

        let jwt_service = Arc::new(JwtService::new(&config.auth.token));

        // 创建服务容器
        let services = ServiceContainer::new(
            &storage,
            cached_db.clone(),
            jwt_service.clone(),
            &config.auth,
        );

        let app_state = rest::AppState {
            services,
            validator: Arc::new(Validator::default()),
        };

        let auth_state = AuthState {
            jwt_service,
            users: cached_db,
        };

        let rate_limit_state = RateLimitState {
            limiter: rate_limiter,
        };

        let router = Self::build_router(
            app_state,
            auth_state,
            rate_limit_state,
            Arc::new(config.auth.basic.clone()),
        );

        Ok(Self { config, router })
    }

    fn build_router(
        app_state: rest::AppState,
        auth_state: AuthState,
        rate_limit_state: RateLimitState,
        basic_auth: Arc<crate::config::BasicAuthConfig>,
    ) -> Router {
        // 无需认证
        let public = Router::new()
            .route("/v1/auth/user", post(rest::register))
            .route("/v1/auth/token", post(rest::create_token))
            .route("/v1/users/activate/:token", put(rest::activate_user))
            .with_state(app_state.clone());

        // 需要 Bearer token
        let protected = Router::new()
            // 用户相关
            .route("/v1/users", get(rest::list_users))
            .route("/v1/users/me", get(rest::get_current_user))
            .route("/v1/users/feed", get(rest::get_feed))
            .route("/v1/users/followed", get(rest::followed_users))
            .route(
                "/v1/users/:user_id",
                get(rest::get_user).delete(rest::delete_user),
            )
            .route("/v1/users/:user_id/follow", put(rest::follow_user))
            .route("/v1/users/:user_id/unfollow", put(rest::unfollow_user))
            .route("/v1/users/:user_id/role", put(rest::update_user_role))
            .route("/v1/users/:user_id/posts", get(rest::get_user_posts))
            // 帖子相关
            .route("/v1/posts", post(rest::create_post))
            .route(
                "/v1/posts/:post_id",
                get(rest::get_post)
                    .patch(rest::update_post)
                    .delete(rest::delete_post),
            )
            .route("/v1/posts/:post_id/comments", post(rest::create_comment))
            // 评论相关
            .route(
                "/v1/comments/:comment_id",
                get(rest::get_comment)
                    .put(rest::update_comment)
                    .delete(rest::delete_comment),
            )
            .with_state(app_state)
            .route_layer(middleware::from_fn_with_state(auth_state, auth_middleware));

        // 调试指标（Basic 认证）
        let debug = Router::new()
            .route("/v1/debug/vars", get(metrics_handler))
            .route_layer(middleware::from_fn_with_state(basic_auth, basic_auth_middleware));

        Router::new()
            .route("/v1/health", get(health::health_check))
            .merge(public)
            .merge(protected)
            .merge(debug)
            .route_layer(middleware::from_fn(metrics_middleware))
            // 限流在认证和业务逻辑之前执行
            .layer(middleware::from_fn_with_state(
                rate_limit_state,
                rate_limit_middleware,
            ))
            .layer(CompressionLayer::new())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http())
    }

    /// 启动服务器
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Server listening on {}", addr);

        let shutdown_signal = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install CTRL+C signal handler: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
        };

        // 限流 key 需要对端地址
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// 获取路由（用于测试）
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
