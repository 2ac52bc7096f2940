// src/services/validator.rs

use crate::error::{AppError, AppResult};
use crate::models::{
    CommentRequest, CreatePostRequest, FeedQuery, LoginRequest, RegisterUserRequest,
    UpdatePostRequest,
};

/// 请求体校验规则
///
/// 显式构造并放在 `AppState` 里，测试可以换成不同的上限。
#[derive(Debug, Clone)]
pub struct Validator {
    pub max_title_len: usize,
    pub max_content_len: usize,
    pub max_username_len: usize,
    pub min_password_len: usize,
    /// bcrypt 只使用前 72 字节
    pub max_password_len: usize,
    pub max_feed_limit: i64,
    pub max_search_len: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            max_title_len: 100,
            max_content_len: 1000,
            max_username_len: 100,
            min_password_len: 3,
            max_password_len: 72,
            max_feed_limit: 20,
            max_search_len: 100,
        }
    }
}

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::ValidationError(msg.into())
}

impl Validator {
    pub fn registration(&self, req: &RegisterUserRequest) -> AppResult<()> {
        self.text("username", &req.username, self.max_username_len)?;
        self.email(&req.email)?;

        let len = req.password.len();
        if len < self.min_password_len || len > self.max_password_len {
            return Err(invalid(format!(
                "password must be between {} and {} bytes",
                self.min_password_len, self.max_password_len
            )));
        }
        Ok(())
    }

    pub fn login(&self, req: &LoginRequest) -> AppResult<()> {
        self.email(&req.email)?;
        if req.password.is_empty() || req.password.len() > self.max_password_len {
            return Err(invalid("password is required"));
        }
        Ok(())
    }

    pub fn new_post(&self, req: &CreatePostRequest) -> AppResult<()> {
        self.text("title", &req.title, self.max_title_len)?;
        self.text("content", &req.content, self.max_content_len)
    }

    pub fn post_update(&self, req: &UpdatePostRequest) -> AppResult<()> {
        if let Some(title) = &req.title {
            self.text("title", title, self.max_title_len)?;
        }
        if let Some(content) = &req.content {
            self.text("content", content, self.max_content_len)?;
        }
        if matches!(req.version, Some(v) if v < 0) {
            return Err(invalid("version must not be negative"));
        }
        Ok(())
    }

    pub fn comment(&self, req: &CommentRequest) -> AppResult<()> {
        self.text("content", &req.content, self.max_content_len)
    }

    pub fn feed(&self, query: &FeedQuery) -> AppResult<()> {
        if query.limit < 1 || query.limit > self.max_feed_limit {
            return Err(invalid(format!(
                "limit must be between 1 and {}",
                self.max_feed_limit
            )));
        }
        if query.offset < 0 {
            return Err(invalid("offset must not be negative"));
        }
        if query.search.chars().count() > self.max_search_len {
            return Err(invalid(format!(
                "search must be at most {} characters",
                self.max_search_len
            )));
        }
        Ok(())
    }

    fn text(&self, field: &str, value: &str, max: usize) -> AppResult<()> {
        if value.trim().is_empty() {
            return Err(invalid(format!("{} is required", field)));
        }
        if value.chars().count() > max {
            return Err(invalid(format!("{} must be at most {} characters", field, max)));
        }
        Ok(())
    }

    fn email(&self, email: &str) -> AppResult<()> {
        if email.len() > 255 || !email.contains('@') {
            return Err(invalid("email is invalid"));
        }
        Ok(())
    }
}
