// src/main.rs

use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use social_core::cli::{Cli, CliHandler, Commands};
use social_core::config::Config;
use social_core::server::Server;
use social_core::storage::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先解析命令行，--help 不应触碰数据库
    let cli = Cli::parse();

    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "social_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        Arc::new(Config::default())
    });

    tracing::info!("Server configuration: {}:{}", config.server.host, config.server.port);
    tracing::info!("Database path: {}", config.database.path);

    // 初始化数据库
    let db = Database::new(&config.database).await?;
    db.run_migrations().await?;

    match cli.command {
        Some(Commands::Token { user_id }) => {
            CliHandler::new(db, &config).issue_token(user_id).await?;
        }
        Some(Commands::Serve) | None => {
            Server::new(config, db).await?.run().await?;
        }
    }

    Ok(())
}
