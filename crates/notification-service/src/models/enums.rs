//! 通知服务枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 用户角色
///
/// 校友与学生存放在同一张用户表中，通过角色区分。
/// 角色判断只在仓储层内部进行，调用方不应该比较角色字符串。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Alumni,
    Student,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alumni => "alumni",
            Self::Student => "student",
        }
    }
}

/// 站内通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum NotificationType {
    Connection,
    Message,
    Like,
    Comment,
    Event,
    Opportunity,
    Mention,
    Achievement,
    Post,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Message => "message",
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Event => "event",
            Self::Opportunity => "opportunity",
            Self::Mention => "mention",
            Self::Achievement => "achievement",
            Self::Post => "post",
            Self::System => "system",
        }
    }
}

/// 偏好设置中的通知类别
///
/// 用户可以按类别分别开关推送和邮件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationCategory {
    Connections,
    Posts,
    Comments,
    Likes,
    Messages,
    Events,
    Jobs,
    Mentorship,
    WeeklyDigest,
}

/// 投递渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Push,
    Email,
    InApp,
}

/// 活动提醒的提前量
///
/// 每个提前量在活动上对应一个独立的幂等标记，标记只会从 false 变为 true。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderOffset {
    OneHour,
    ThreeHours,
    OneDay,
}

impl ReminderOffset {
    pub const ALL: [ReminderOffset; 3] = [Self::OneHour, Self::ThreeHours, Self::OneDay];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneHour => "1_hour",
            Self::ThreeHours => "3_hours",
            Self::OneDay => "1_day",
        }
    }

    /// 对应的幂等标记列名
    pub fn flag_column(&self) -> &'static str {
        match self {
            Self::OneHour => "reminder_sent_1_hour",
            Self::ThreeHours => "reminder_sent_3_hours",
            Self::OneDay => "reminder_sent_1_day",
        }
    }

    /// 扫描窗口 `[start, end]`（含两端）
    ///
    /// - 1 小时：`[now, now+1h]`
    /// - 3 小时：`[now+1h, now+3h]`
    /// - 1 天：`[now+24h, now+25h]`
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Self::OneHour => (now, now + Duration::hours(1)),
            Self::ThreeHours => (now + Duration::hours(1), now + Duration::hours(3)),
            Self::OneDay => (now + Duration::hours(24), now + Duration::hours(25)),
        }
    }

    /// 提醒文案中的剩余时间描述
    pub fn time_until_label(&self) -> &'static str {
        match self {
            Self::OneHour => "1 hour",
            Self::ThreeHours => "3 hours",
            Self::OneDay => "1 day",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_type_serialization() {
        let json = serde_json::to_string(&NotificationType::Opportunity).unwrap();
        assert_eq!(json, "\"opportunity\"");

        let parsed: NotificationType = serde_json::from_str("\"achievement\"").unwrap();
        assert_eq!(parsed, NotificationType::Achievement);
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&NotificationCategory::WeeklyDigest).unwrap();
        assert_eq!(json, "\"weeklyDigest\"");
    }

    #[test]
    fn test_reminder_windows_do_not_overlap() {
        let now = Utc::now();
        let (h1_start, h1_end) = ReminderOffset::OneHour.window(now);
        let (h3_start, h3_end) = ReminderOffset::ThreeHours.window(now);
        let (d1_start, d1_end) = ReminderOffset::OneDay.window(now);

        assert_eq!(h1_start, now);
        assert_eq!(h1_end, h3_start);
        assert_eq!(h3_end - now, Duration::hours(3));
        assert_eq!(d1_start - now, Duration::hours(24));
        assert_eq!(d1_end - d1_start, Duration::hours(1));
    }

    #[test]
    fn test_reminder_flag_columns_are_distinct() {
        let columns: std::collections::HashSet<_> =
            ReminderOffset::ALL.iter().map(|o| o.flag_column()).collect();
        assert_eq!(columns.len(), 3);
        assert_eq!(ReminderOffset::ThreeHours.time_until_label(), "3 hours");
    }
}
