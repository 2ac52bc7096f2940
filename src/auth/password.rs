// src/auth/password.rs

use std::fmt;

use crate::error::{AppError, AppResult};

/// 密码凭据
///
/// 只保存 bcrypt 哈希。只能通过 [`Password::hash`]（对明文做加盐慢哈希）
/// 或 [`Password::from_hash`]（从存储中读出）构造，明文在哈希后立即丢弃。
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Password {
    hash: String,
}

impl Password {
    /// 对明文计算哈希，`cost` 为 bcrypt 工作因子
    pub fn hash(plaintext: &str, cost: u32) -> AppResult<Self> {
        let hash = bcrypt::hash(plaintext, cost)
            .map_err(|e| AppError::InternalError(format!("Failed to hash password: {}", e)))?;
        Ok(Self { hash })
    }

    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    /// 校验明文；哈希缺失或无法解析时一律返回 false
    pub fn compare(&self, plaintext: &str) -> bool {
        if self.hash.is_empty() {
            return false;
        }
        bcrypt::verify(plaintext, &self.hash).unwrap_or(false)
    }

    pub fn as_hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 测试中使用最低工作因子，避免拖慢测试
    const TEST_COST: u32 = 4;

    #[test]
    fn test_hash_and_compare() {
        let password = Password::hash("password123", TEST_COST).unwrap();

        assert!(password.compare("password123"));
        assert!(!password.compare("wrongpassword"));
        assert_ne!(password.as_hash(), "password123");
    }

    #[test]
    fn test_salted() {
        let a = Password::hash("same", TEST_COST).unwrap();
        let b = Password::hash("same", TEST_COST).unwrap();
        assert_ne!(a.as_hash(), b.as_hash());
    }

    #[test]
    fn test_missing_or_garbage_hash() {
        assert!(!Password::default().compare(""));
        assert!(!Password::default().compare("anything"));
        assert!(!Password::from_hash("not-a-bcrypt-hash").compare("anything"));
    }

    #[test]
    fn test_debug_redacts_hash() {
        let password = Password::hash("secret", TEST_COST).unwrap();
        let debug = format!("{:?}", password);
        assert!(!debug.contains(password.as_hash()));
    }
}
