//! 通知服务错误类型
//!
//! 投递类错误（无 token、token 失效、网关传输失败）不会中断批量流程，
//! 调用方通常把它们折算成结果对象而不是向上传播。

use thiserror::Error;
use uuid::Uuid;

/// 通知服务错误类型
#[derive(Debug, Error)]
pub enum NotificationError {
    // === 投递相关错误 ===
    #[error("用户未注册推送 token: user_id={0}")]
    NoTokenRegistered(String),

    #[error("推送 token 已失效: user_id={0}")]
    InvalidOrExpiredToken(String),

    #[error("推送网关传输失败: {0}")]
    Transport(String),

    // === 业务对象相关错误 ===
    #[error("接收人不存在: {0}")]
    RecipientNotFound(String),

    #[error("活动没有参与者: event_id={0}")]
    NoAttendees(String),

    #[error("通知不存在: {0}")]
    NotificationNotFound(Uuid),

    // === 后台队列 ===
    #[error("后台通知队列已满")]
    QueueFull,

    #[error("后台通知队列已关闭")]
    QueueClosed,

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("邮件发送失败: {0}")]
    Email(String),

    #[error("模板渲染失败: {0}")]
    Template(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 通知服务 Result 类型别名
pub type Result<T> = std::result::Result<T, NotificationError>;

impl NotificationError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Database(_) | Self::QueueFull | Self::Email(_)
        )
    }

    /// 是否为单个接收人维度的投递错误
    ///
    /// 这类错误只影响当前接收人，批量流程应记录后继续。
    pub fn is_delivery_error(&self) -> bool {
        matches!(
            self,
            Self::NoTokenRegistered(_)
                | Self::InvalidOrExpiredToken(_)
                | Self::Transport(_)
                | Self::RecipientNotFound(_)
        )
    }

    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoTokenRegistered(_) => "NO_TOKEN_REGISTERED",
            Self::InvalidOrExpiredToken(_) => "INVALID_OR_EXPIRED_TOKEN",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::RecipientNotFound(_) => "RECIPIENT_NOT_FOUND",
            Self::NoAttendees(_) => "NO_ATTENDEES",
            Self::NotificationNotFound(_) => "NOTIFICATION_NOT_FOUND",
            Self::QueueFull => "QUEUE_FULL",
            Self::QueueClosed => "QUEUE_CLOSED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Email(_) => "EMAIL_ERROR",
            Self::Template(_) => "TEMPLATE_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(NotificationError::Transport("timeout".to_string()).is_retryable());
        assert!(NotificationError::QueueFull.is_retryable());
        assert!(!NotificationError::NoTokenRegistered("u1".to_string()).is_retryable());
        assert!(!NotificationError::InvalidOrExpiredToken("u1".to_string()).is_retryable());
        assert!(!NotificationError::Validation("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_delivery_errors_are_per_recipient() {
        assert!(NotificationError::NoTokenRegistered("u1".to_string()).is_delivery_error());
        assert!(NotificationError::RecipientNotFound("u1".to_string()).is_delivery_error());
        assert!(!NotificationError::QueueClosed.is_delivery_error());
        assert!(!NotificationError::Internal("boom".to_string()).is_delivery_error());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            NotificationError::NoTokenRegistered("u1".to_string()).error_code(),
            "NO_TOKEN_REGISTERED"
        );
        assert_eq!(
            NotificationError::NoAttendees("e1".to_string()).error_code(),
            "NO_ATTENDEES"
        );
        assert_eq!(NotificationError::QueueFull.error_code(), "QUEUE_FULL");
    }

    #[test]
    fn test_error_display() {
        let err = NotificationError::InvalidOrExpiredToken("user-123".to_string());
        assert!(err.to_string().contains("user-123"));

        let id = Uuid::now_v7();
        let err = NotificationError::NotificationNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
