//! 活动与提醒状态

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::ReminderOffset;

/// 活动
///
/// 三个提醒标记彼此独立，每个只会被置为 true 一次。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub location: Option<String>,
    /// 已报名的参与者
    #[sqlx(default)]
    pub attendee_ids: Vec<String>,
    pub reminder_sent_1_hour: bool,
    pub reminder_sent_3_hours: bool,
    pub reminder_sent_1_day: bool,
}

impl EventRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, starts_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            starts_at,
            location: None,
            attendee_ids: Vec::new(),
            reminder_sent_1_hour: false,
            reminder_sent_3_hours: false,
            reminder_sent_1_day: false,
        }
    }

    pub fn with_attendees<I, S>(mut self, attendees: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attendee_ids = attendees.into_iter().map(Into::into).collect();
        self
    }

    pub fn reminder_sent(&self, offset: ReminderOffset) -> bool {
        match offset {
            ReminderOffset::OneHour => self.reminder_sent_1_hour,
            ReminderOffset::ThreeHours => self.reminder_sent_3_hours,
            ReminderOffset::OneDay => self.reminder_sent_1_day,
        }
    }

    /// 置位提醒标记，返回本次调用是否真正完成了 false → true 的转换
    pub fn mark_reminder_sent(&mut self, offset: ReminderOffset) -> bool {
        let flag = match offset {
            ReminderOffset::OneHour => &mut self.reminder_sent_1_hour,
            ReminderOffset::ThreeHours => &mut self.reminder_sent_3_hours,
            ReminderOffset::OneDay => &mut self.reminder_sent_1_day,
        };
        !std::mem::replace(flag, true)
    }

    /// 活动开始时间是否落在提醒窗口内，且该提醒尚未发送
    pub fn is_due(&self, offset: ReminderOffset, now: DateTime<Utc>) -> bool {
        let (start, end) = offset.window(now);
        !self.reminder_sent(offset) && self.starts_at >= start && self.starts_at <= end
    }

    pub fn action_url(&self) -> String {
        format!("/events/{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_mark_reminder_sent_transitions_once() {
        let mut event = EventRecord::new("e1", "Alumni Meetup", Utc::now());
        assert!(event.mark_reminder_sent(ReminderOffset::OneHour));
        assert!(!event.mark_reminder_sent(ReminderOffset::OneHour));
        assert!(event.reminder_sent(ReminderOffset::OneHour));
        assert!(!event.reminder_sent(ReminderOffset::ThreeHours));
        assert!(!event.reminder_sent(ReminderOffset::OneDay));
    }

    #[test]
    fn test_is_due_respects_window_and_flag() {
        let now = Utc::now();
        let mut event = EventRecord::new("e1", "Alumni Meetup", now + Duration::minutes(40));

        assert!(event.is_due(ReminderOffset::OneHour, now));
        assert!(!event.is_due(ReminderOffset::ThreeHours, now));
        assert!(!event.is_due(ReminderOffset::OneDay, now));

        event.mark_reminder_sent(ReminderOffset::OneHour);
        assert!(!event.is_due(ReminderOffset::OneHour, now));
    }

    #[test]
    fn test_action_url() {
        let event = EventRecord::new("e42", "Talk", Utc::now());
        assert_eq!(event.action_url(), "/events/e42");
    }
}
