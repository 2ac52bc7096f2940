// src/auth/permissions.rs

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::storage::RoleStore;

/// 角色名常量，与 roles 表的种子数据一致
pub mod roles {
    pub const USER: &str = "user";
    pub const MODERATOR: &str = "moderator";
    pub const ADMIN: &str = "admin";
}

/// 基于所有权和角色等级的授权
#[derive(Clone)]
pub struct PermissionChecker {
    roles: Arc<dyn RoleStore>,
}

impl PermissionChecker {
    pub fn new(roles: Arc<dyn RoleStore>) -> Self {
        Self { roles }
    }

    /// 资源所有者直接放行；否则要求 principal 的角色等级不低于 `required_role`
    pub async fn authorize(&self, principal: &User, owner_id: i64, required_role: &str) -> AppResult<()> {
        if principal.id == owner_id {
            return Ok(());
        }
        self.require_role(principal, required_role).await
    }

    /// 只看角色等级，不考虑所有权（管理操作）
    pub async fn require_role(&self, principal: &User, required_role: &str) -> AppResult<()> {
        // 未知角色是配置错误，不能当作拒绝处理
        let role = self
            .roles
            .get_by_name(required_role)
            .await?
            .ok_or_else(|| AppError::RoleNotFound(required_role.to_string()))?;

        if principal.role.level >= role.level {
            Ok(())
        } else {
            tracing::debug!(
                user_id = principal.id,
                role = %principal.role.name,
                required = %role.name,
                "Permission denied"
            );
            Err(AppError::Forbidden)
        }
    }
}
