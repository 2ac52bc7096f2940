// src/lib.rs

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod server;
pub mod services;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{AppError, AppResult};
