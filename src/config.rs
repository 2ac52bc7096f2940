// src/config.rs

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub rate_limiter: RateLimiterConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
    /// 单次存储/缓存调用的超时上限
    pub query_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub basic: BasicAuthConfig,
    pub token: TokenConfig,
    pub bcrypt_cost: u32,
    pub invitation_expiry_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuthConfig {
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub expiry_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    pub enabled: bool,
    pub requests_per_window: u32,
    pub window_secs: u64,
}

impl RateLimiterConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_capacity: u64,
    pub ttl_secs: u64,
}

impl Config {
    pub fn load() -> anyhow::Result<Arc<Self>> {
        dotenvy::dotenv().ok();

        // 内置默认值打底，文件和环境变量只需要覆盖部分字段
        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("SOCIAL").separator("__"))
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(Arc::new(config))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8081,
            },
            database: DatabaseConfig {
                path: "social.db".to_string(),
                max_connections: 10,
                query_timeout_secs: 5,
            },
            auth: AuthConfig {
                basic: BasicAuthConfig {
                    user: "admin".to_string(),
                    pass: "admin".to_string(),
                },
                token: TokenConfig {
                    secret: "change-me-in-production".to_string(),
                    issuer: "social-core".to_string(),
                    audience: "social-core".to_string(),
                    expiry_hours: 72, // 3 天
                },
                bcrypt_cost: bcrypt::DEFAULT_COST,
                invitation_expiry_hours: 72,
            },
            rate_limiter: RateLimiterConfig {
                enabled: true,
                requests_per_window: 20,
                window_secs: 5,
            },
            cache: CacheConfig {
                enabled: true,
                max_capacity: 10_000,
                ttl_secs: 60,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_survive_layering() {
        let layered = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default()).unwrap())
            .set_override("rate_limiter.requests_per_window", 5)
            .unwrap()
            .build()
            .unwrap();

        let config: Config = layered.try_deserialize().unwrap();
        assert_eq!(config.rate_limiter.requests_per_window, 5);
        assert_eq!(config.rate_limiter.window(), Duration::from_secs(5));
        assert_eq!(config.database.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.auth.token.issuer, "social-core");
    }
}
