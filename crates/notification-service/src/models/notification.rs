//! 站内通知实体定义

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{NotificationType, UserRole};

/// 通知关联的业务对象
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RelatedRefs {
    #[sqlx(rename = "related_post")]
    pub post: Option<String>,
    #[sqlx(rename = "related_event")]
    pub event: Option<String>,
    #[sqlx(rename = "related_opportunity")]
    pub opportunity: Option<String>,
}

impl RelatedRefs {
    pub fn event(id: impl Into<String>) -> Self {
        Self {
            event: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn post(id: impl Into<String>) -> Self {
        Self {
            post: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn opportunity(id: impl Into<String>) -> Self {
        Self {
            opportunity: Some(id.into()),
            ..Self::default()
        }
    }
}

/// 站内通知
///
/// 由编排器创建，之后只有接收人本人可以标记已读或删除。
/// 用户删除是软删除；已读且超过保留期的通知由后台清理任务物理删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: String,
    pub recipient_role: UserRole,
    pub sender_id: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    #[sqlx(flatten)]
    pub related: RelatedRefs,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// 已读且创建时间超过保留期的通知可以被物理删除，未读通知无论多旧都保留
    pub fn is_eligible_for_purge(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.is_read && self.created_at <= now - retention
    }

    pub fn is_visible_to(&self, recipient_id: &str) -> bool {
        !self.is_deleted && self.recipient_id == recipient_id
    }
}

/// 创建通知的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub recipient_id: String,
    pub recipient_role: UserRole,
    pub sender_id: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    #[serde(default)]
    pub related: RelatedRefs,
}

impl NewNotification {
    pub fn new(
        recipient_id: impl Into<String>,
        recipient_role: UserRole,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            recipient_role,
            sender_id: None,
            notification_type,
            title: title.into(),
            message: message.into(),
            action_url: None,
            related: RelatedRefs::default(),
        }
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn with_action_url(mut self, action_url: impl Into<String>) -> Self {
        self.action_url = Some(action_url.into());
        self
    }

    pub fn with_related(mut self, related: RelatedRefs) -> Self {
        self.related = related;
        self
    }

    /// 生成待持久化的通知，初始为未读、未删除
    pub fn into_notification(self, now: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::now_v7(),
            recipient_id: self.recipient_id,
            recipient_role: self.recipient_role,
            sender_id: self.sender_id,
            notification_type: self.notification_type,
            title: self.title,
            message: self.message,
            action_url: self.action_url,
            related: self.related,
            is_read: false,
            read_at: None,
            is_deleted: false,
            created_at: now,
        }
    }
}

/// 列表查询过滤条件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    pub is_read: Option<bool>,
}

impl NotificationFilter {
    pub fn matches(&self, notification: &Notification) -> bool {
        self.notification_type
            .is_none_or(|t| t == notification.notification_type)
            && self.is_read.is_none_or(|r| r == notification.is_read)
    }
}

/// 分页参数，页码从 1 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub total_count: u64,
    pub unread_count: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

/// 按类型统计的数量（用于周报）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TypeCount {
    pub notification_type: NotificationType,
    pub count: i64,
}

impl TypeCount {
    pub fn count_of(counts: &[TypeCount], notification_type: NotificationType) -> i64 {
        counts
            .iter()
            .find(|c| c.notification_type == notification_type)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}
