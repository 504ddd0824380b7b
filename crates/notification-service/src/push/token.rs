//! 推送 token 目录
//!
//! 每个用户最多一个 token，后注册者覆盖。token 格式不在这里校验。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{NotificationError, Result};
use crate::models::{PushTokenEntry, UserRecord, UserRole};
use crate::repository::UserRepositoryTrait;

/// 不区分角色查找 token 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    UnknownUser,
    /// 用户存在，但没有可用的 token
    Missing { role: UserRole },
    Found { role: UserRole, token: String },
}

/// 推送 token 目录
pub struct TokenDirectory {
    users: Arc<dyn UserRepositoryTrait>,
}

impl TokenDirectory {
    pub fn new(users: Arc<dyn UserRepositoryTrait>) -> Self {
        Self { users }
    }

    pub async fn get_token(&self, user_id: &str, role: UserRole) -> Result<Option<String>> {
        Ok(self.users.get_user(user_id, role).await?.and_then(usable_token))
    }

    /// 调用方不知道角色时按用户 id 查找 token，同时带回用户角色
    pub async fn lookup(&self, user_id: &str) -> Result<TokenLookup> {
        let Some(user) = self.users.find_user(user_id).await? else {
            return Ok(TokenLookup::UnknownUser);
        };
        let role = user.role;
        Ok(match usable_token(user) {
            Some(token) => TokenLookup::Found { role, token },
            None => TokenLookup::Missing { role },
        })
    }

    /// 清除单个用户的 token
    ///
    /// 用户不存在或已无 token 时视为成功；存储错误只记日志，不影响调用方。
    pub async fn clear_token(&self, user_id: &str, role: UserRole) {
        match self.users.clear_push_token(user_id, role).await {
            Ok(true) => info!(user_id, role = role.as_str(), "已清除失效的推送 token"),
            Ok(false) => debug!(user_id, role = role.as_str(), "无可清除的推送 token"),
            Err(e) => warn!(user_id, error = %e, "清除推送 token 失败"),
        }
    }

    /// 按 token 值批量清除，返回被修改的用户数；存储错误只记日志
    pub async fn clear_tokens(&self, tokens: &[String]) -> u64 {
        if tokens.is_empty() {
            return 0;
        }
        match self.users.clear_push_tokens(tokens).await {
            Ok(cleared) => {
                info!(requested = tokens.len(), cleared, "已批量清除失效的推送 token");
                cleared
            }
            Err(e) => {
                warn!(requested = tokens.len(), error = %e, "批量清除推送 token 失败");
                0
            }
        }
    }

    /// 注册 token（覆盖旧值）
    pub async fn register_token(&self, user_id: &str, role: UserRole, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(NotificationError::Validation("推送 token 不能为空".to_string()));
        }

        if !self.users.set_push_token(user_id, role, token).await? {
            return Err(NotificationError::RecipientNotFound(user_id.to_string()));
        }
        info!(user_id, role = role.as_str(), "推送 token 已注册");
        Ok(())
    }

    /// 批量解析 token，没有 token 的用户不出现在结果中
    pub async fn resolve_tokens(&self, user_ids: &[String]) -> Result<Vec<PushTokenEntry>> {
        self.users.find_push_tokens(user_ids).await
    }
}

/// 空字符串视为未注册
fn usable_token(user: UserRecord) -> Option<String> {
    user.push_token.filter(|t| !t.is_empty())
}
