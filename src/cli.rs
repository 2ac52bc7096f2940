// src/cli.rs

use clap::{Parser, Subcommand};

use crate::auth::JwtService;
use crate::config::Config;
use crate::storage::{Database, UserStore};

#[derive(Parser)]
#[command(name = "social-core")]
#[command(about = "Content-sharing API server and operator CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 启动 API 服务器 (默认)
    Serve,

    /// 为指定用户签发 Bearer token（调试用）
    Token {
        /// 用户 ID
        #[arg(short, long)]
        user_id: i64,
    },
}

pub struct CliHandler {
    db: Database,
    jwt_service: JwtService,
}

impl CliHandler {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            db,
            jwt_service: JwtService::new(&config.auth.token),
        }
    }

    pub async fn issue_token(&self, user_id: i64) -> anyhow::Result<()> {
        match self.db.get_by_id(user_id).await? {
            Some(user) => {
                if !user.is_active {
                    println!("警告: 用户 '{}' 尚未激活，token 将无法通过认证", user.username);
                }
                let token = self.jwt_service.generate_token(user.id)?;
                println!("{}", token);
            }
            None => {
                println!("错误: 用户 {} 不存在", user_id);
            }
        }
        Ok(())
    }
}
