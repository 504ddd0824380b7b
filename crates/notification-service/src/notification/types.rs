//! 通知类型定义
//!
//! 编排器的请求与结果结构，以及模板渲染上下文。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{NewNotification, Notification, NotificationType, RelatedRefs, UserRole};
use crate::push::{BulkPushReport, PushOutcome};

/// 完整通知请求
///
/// 一次请求可同时写站内通知和发送推送，两个渠道互不影响。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCompleteRequest {
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
    pub image_url: Option<String>,
    pub send_push: bool,
    pub send_in_app: bool,
}

impl SendCompleteRequest {
    /// 默认两个渠道都发送
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
            image_url: None,
            send_push: true,
            send_in_app: true,
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

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_channels(mut self, send_push: bool, send_in_app: bool) -> Self {
        self.send_push = send_push;
        self.send_in_app = send_in_app;
        self
    }

    pub fn to_new_notification(&self) -> NewNotification {
        NewNotification {
            recipient_id: self.recipient_id.clone(),
            recipient_role: self.recipient_role,
            sender_id: self.sender_id.clone(),
            notification_type: self.notification_type,
            title: self.title.clone(),
            message: self.message.clone(),
            action_url: self.action_url.clone(),
            related: self.related.clone(),
        }
    }
}

/// 完整通知结果
///
/// 未请求的渠道为 `None`；站内通知写入失败时错误信息放在 `in_app_error`。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteNotificationResult {
    pub push: Option<PushOutcome>,
    pub in_app: Option<Notification>,
    pub in_app_error: Option<String>,
}

impl CompleteNotificationResult {
    /// 至少一个渠道成功
    pub fn any_delivered(&self) -> bool {
        self.in_app.is_some() || self.push.as_ref().is_some_and(|p| p.success)
    }
}

/// 批量通知的接收人
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub id: String,
    pub role: UserRole,
}

impl Recipient {
    pub fn new(id: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// 同一内容发给多个接收人
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchNotificationRequest {
    pub recipients: Vec<Recipient>,
    pub sender_id: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    #[serde(default)]
    pub related: RelatedRefs,
    pub send_push: bool,
    pub send_in_app: bool,
}

/// 批量通知结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchNotificationResult {
    pub in_app_created: usize,
    pub in_app_failed: usize,
    pub push: Option<BulkPushReport>,
}

/// 最近 7 天的个人活动统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStats {
    pub new_messages: i64,
    pub post_likes: i64,
    pub post_comments: i64,
    pub events_attending: i64,
    pub new_jobs: i64,
}

impl WeeklyStats {
    pub fn total(&self) -> i64 {
        self.new_messages + self.post_likes + self.post_comments + self.events_attending + self.new_jobs
    }
}

/// 周报批量发送汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestSummary {
    pub total_users: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

/// 通知上下文
///
/// 用于模板渲染的上下文数据
#[derive(Debug, Clone, Default)]
pub struct NotificationContext {
    /// 变量映射
    pub variables: HashMap<String, String>,
}

impl NotificationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// 链式设置，便于一次构造
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_complete_request_defaults() {
        let request = SendCompleteRequest::new(
            "u1",
            UserRole::Student,
            NotificationType::Connection,
            "t",
            "m",
        )
        .with_sender("u2")
        .with_action_url("/profile/u2");

        assert!(request.send_push && request.send_in_app);
        let new = request.to_new_notification();
        assert_eq!(new.recipient_id, "u1");
        assert_eq!(new.sender_id.as_deref(), Some("u2"));
        assert_eq!(new.action_url.as_deref(), Some("/profile/u2"));
    }

    #[test]
    fn test_send_complete_request_wire_format() {
        let request: SendCompleteRequest = serde_json::from_value(serde_json::json!({
            "recipientId": "u1",
            "recipientRole": "alumni",
            "senderId": null,
            "type": "event",
            "title": "t",
            "message": "m",
            "actionUrl": "/events/e1",
            "imageUrl": null,
            "sendPush": false,
            "sendInApp": true
        }))
        .unwrap();

        assert_eq!(request.notification_type, NotificationType::Event);
        assert_eq!(request.related, RelatedRefs::default());
        assert!(!request.send_push);
    }

    #[test]
    fn test_any_delivered() {
        let mut result = CompleteNotificationResult::default();
        assert!(!result.any_delivered());

        result.push = Some(PushOutcome::delivered("m1"));
        assert!(result.any_delivered());
    }

    #[test]
    fn test_notification_context() {
        let context = NotificationContext::new()
            .with("sender_name", "Ada")
            .with("preview", "hello");

        assert_eq!(context.get("sender_name"), Some("Ada"));
        assert_eq!(context.get("not_exists"), None);
    }
}
