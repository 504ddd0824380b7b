//! 用户与通知偏好
//!
//! 用户资料由外部系统维护，这里只保留通知链路需要的字段：
//! 角色、是否活跃、推送 token、邮箱和偏好设置。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{DeliveryChannel, NotificationCategory, UserRole};

/// 用户记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub role: UserRole,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub is_active: bool,
    /// 当前注册的设备 token，后注册者覆盖
    pub push_token: Option<String>,
    /// 为空表示用户从未设置过偏好，所有渠道默认开启
    pub preferences: Option<NotificationPreferences>,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: id.into(),
            role,
            first_name: String::new(),
            last_name: String::new(),
            email: None,
            is_active: true,
            push_token: None,
            preferences: None,
            last_active_at: None,
        }
    }

    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_push_token(mut self, token: impl Into<String>) -> Self {
        self.push_token = Some(token.into());
        self
    }

    pub fn with_preferences(mut self, preferences: NotificationPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_last_active_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_active_at = Some(at);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// 是否应通过指定渠道发送该类别的通知
    pub fn should_send(&self, category: NotificationCategory, channel: DeliveryChannel) -> bool {
        self.preferences
            .as_ref()
            .is_none_or(|prefs| prefs.allows(category, channel))
    }

    /// 最近一段时间内是否没有活动（没有活动记录也视为不活跃）
    pub fn is_idle_for(&self, now: DateTime<Utc>, idle: Duration) -> bool {
        self.last_active_at.is_none_or(|at| now - at > idle)
    }
}

/// 已解析的推送 token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PushTokenEntry {
    #[sqlx(rename = "id")]
    pub user_id: String,
    pub role: UserRole,
    #[sqlx(rename = "push_token")]
    pub token: String,
}

/// 单个渠道的偏好开关
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelPreferences {
    pub enabled: bool,
    pub connections: bool,
    pub posts: bool,
    pub comments: bool,
    pub likes: bool,
    pub messages: bool,
    pub events: bool,
    pub jobs: bool,
    pub mentorship: bool,
    pub weekly_digest: bool,
}

impl Default for ChannelPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            connections: true,
            posts: true,
            comments: true,
            likes: true,
            messages: true,
            events: true,
            jobs: true,
            mentorship: true,
            weekly_digest: true,
        }
    }
}

impl ChannelPreferences {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn category(&self, category: NotificationCategory) -> bool {
        match category {
            NotificationCategory::Connections => self.connections,
            NotificationCategory::Posts => self.posts,
            NotificationCategory::Comments => self.comments,
            NotificationCategory::Likes => self.likes,
            NotificationCategory::Messages => self.messages,
            NotificationCategory::Events => self.events,
            NotificationCategory::Jobs => self.jobs,
            NotificationCategory::Mentorship => self.mentorship,
            NotificationCategory::WeeklyDigest => self.weekly_digest,
        }
    }
}

/// 用户通知偏好
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPreferences {
    pub push: ChannelPreferences,
    pub email: ChannelPreferences,
    pub in_app_enabled: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            push: ChannelPreferences::default(),
            email: ChannelPreferences::default(),
            in_app_enabled: true,
        }
    }
}

impl NotificationPreferences {
    /// 推送与邮件需要渠道总开关和类别开关同时打开；站内通知只看总开关
    pub fn allows(&self, category: NotificationCategory, channel: DeliveryChannel) -> bool {
        match channel {
            DeliveryChannel::Push => self.push.enabled && self.push.category(category),
            DeliveryChannel::Email => self.email.enabled && self.email.category(category),
            DeliveryChannel::InApp => self.in_app_enabled,
        }
    }
}
