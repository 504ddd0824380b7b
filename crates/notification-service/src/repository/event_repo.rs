//! 活动仓储
//!
//! 提醒标记的置位使用条件更新 `SET flag = TRUE WHERE flag = FALSE`，
//! 由数据库保证同一活动、同一提前量只有一个调用方能完成转换。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::traits::EventRepositoryTrait;
use crate::error::Result;
use crate::models::{EventRecord, ReminderOffset};

const EVENT_SELECT: &str = r#"
    SELECT e.id, e.title, e.starts_at, e.location,
           COALESCE(
               ARRAY_AGG(a.user_id ORDER BY a.registered_at) FILTER (WHERE a.user_id IS NOT NULL),
               ARRAY[]::TEXT[]
           ) AS attendee_ids,
           e.reminder_sent_1_hour, e.reminder_sent_3_hours, e.reminder_sent_1_day
    FROM events e
    LEFT JOIN event_attendees a ON a.event_id = e.id
"#;

/// 活动仓储
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_event(&self, event_id: &str) -> Result<Option<EventRecord>> {
        let sql = format!("{EVENT_SELECT} WHERE e.id = $1 GROUP BY e.id");
        let event = sqlx::query_as::<_, EventRecord>(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(event)
    }

    pub async fn find_pending_reminders(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: ReminderOffset,
    ) -> Result<Vec<EventRecord>> {
        // 列名来自枚举常量，不含外部输入
        let sql = format!(
            "{EVENT_SELECT} WHERE e.starts_at BETWEEN $1 AND $2 AND e.{} = FALSE \
             GROUP BY e.id ORDER BY e.starts_at",
            offset.flag_column()
        );
        let events = sqlx::query_as::<_, EventRecord>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        Ok(events)
    }

    pub async fn get_attendees(&self, event_id: &str) -> Result<Vec<String>> {
        let attendees = sqlx::query_scalar::<_, String>(
            r#"
            SELECT user_id
            FROM event_attendees
            WHERE event_id = $1
            ORDER BY registered_at
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attendees)
    }

    pub async fn try_mark_reminder_sent(
        &self,
        event_id: &str,
        offset: ReminderOffset,
    ) -> Result<bool> {
        let column = offset.flag_column();
        let sql = format!(
            "UPDATE events SET {column} = TRUE, updated_at = NOW() \
             WHERE id = $1 AND {column} = FALSE"
        );
        let result = sqlx::query(&sql)
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl EventRepositoryTrait for EventRepository {
    async fn get_event(&self, event_id: &str) -> Result<Option<EventRecord>> {
        self.get_event(event_id).await
    }

    async fn find_pending_reminders(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: ReminderOffset,
    ) -> Result<Vec<EventRecord>> {
        self.find_pending_reminders(start, end, offset).await
    }

    async fn get_attendees(&self, event_id: &str) -> Result<Vec<String>> {
        self.get_attendees(event_id).await
    }

    async fn try_mark_reminder_sent(&self, event_id: &str, offset: ReminderOffset) -> Result<bool> {
        self.try_mark_reminder_sent(event_id, offset).await
    }
}
