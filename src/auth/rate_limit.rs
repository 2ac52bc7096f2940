// src/auth/rate_limit.rs

//! 固定窗口限流
//!
//! 每个 key（客户端地址）维护一个 `{count, window_start}` 窗口：
//! 窗口过期则重置为 1 并放行，否则计数加 1，计数不超过上限就放行。
//!
//! 这是粗粒度算法：窗口边界两侧的突发请求加起来可以在很短时间内
//! 达到 2 倍上限（上一个窗口末尾 N 个 + 下一个窗口开头 N 个）。
//! 这是已知且接受的行为，不是滑动窗口也不是令牌桶。

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateLimiterConfig;
use crate::error::AppError;
use crate::metrics::record_rate_limited;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_window: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 20,
            window: Duration::from_secs(5),
        }
    }
}

impl From<&RateLimiterConfig> for RateLimitConfig {
    fn from(config: &RateLimiterConfig) -> Self {
        Self {
            enabled: config.enabled,
            requests_per_window: config.requests_per_window,
            window: config.window(),
        }
    }
}

/// 一次限流判定的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// 被拒绝时距离当前窗口结束的剩余时间（建议值）
    pub retry_after: Duration,
}

impl Decision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }
}

struct Window {
    count: u32,
    start: Instant,
}

pub struct RateLimiter {
    // 按 key 分片加锁，不同 key 之间互不阻塞
    windows: DashMap<String, Window>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    /// 判定 key 的本次请求是否放行
    ///
    /// 读-改-写在该 key 的分片锁内完成，并发调用不会丢失计数。
    pub fn allow(&self, key: &str) -> Decision {
        if !self.config.enabled {
            return Decision::allowed();
        }

        let now = Instant::now();
        let mut window = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            start: now,
        });

        let elapsed = now.duration_since(window.start);
        if elapsed >= self.config.window {
            window.count = 1;
            window.start = now;
            return Decision::allowed();
        }

        window.count = window.count.saturating_add(1);
        if window.count <= self.config.requests_per_window {
            Decision::allowed()
        } else {
            Decision {
                allowed: false,
                retry_after: self.config.window - elapsed,
            }
        }
    }

    /// 清理已经过期的窗口；过期窗口下一次请求本来就会被重置，删除不改变行为
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.windows
            .retain(|_, w| now.duration_since(w.start) < window);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                self.cleanup();
            }
        });
    }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
}

/// 限流中间件，在认证和业务逻辑之前执行
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = extract_client_key(&request);

    let decision = state.limiter.allow(&key);
    if !decision.allowed {
        tracing::warn!(
            client = %key,
            method = %request.method(),
            path = %request.uri().path(),
            retry_after_ms = decision.retry_after.as_millis() as u64,
            "Rate limit exceeded"
        );
        record_rate_limited();
        return Err(AppError::RateLimitExceeded {
            retry_after: decision.retry_after,
        });
    }

    Ok(next.run(request).await)
}

pub fn extract_client_key(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(ip) = value.split(',').next() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
