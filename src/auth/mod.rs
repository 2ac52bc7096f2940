// src/auth/mod.rs

pub mod basic;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod permissions;
pub mod rate_limit;

pub use basic::*;
pub use jwt::*;
pub use middleware::*;
pub use password::Password;
pub use permissions::*;
pub use rate_limit::*;
