//! 站内通知仓储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::traits::NotificationRepositoryTrait;
use crate::error::Result;
use crate::models::{Notification, NotificationFilter, PageRequest, TypeCount};

/// 站内通知仓储
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, n: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, recipient_id, recipient_role, sender_id, notification_type, title, message,
                action_url, related_post, related_event, related_opportunity,
                is_read, read_at, is_deleted, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(n.id)
        .bind(&n.recipient_id)
        .bind(n.recipient_role)
        .bind(&n.sender_id)
        .bind(n.notification_type)
        .bind(&n.title)
        .bind(&n.message)
        .bind(&n.action_url)
        .bind(&n.related.post)
        .bind(&n.related.event)
        .bind(&n.related.opportunity)
        .bind(n.is_read)
        .bind(n.read_at)
        .bind(n.is_deleted)
        .bind(n.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 可选过滤条件用 `$n IS NULL OR ...` 表达，避免拼接 SQL
    pub async fn list(
        &self,
        recipient_id: &str,
        filter: NotificationFilter,
        page: PageRequest,
    ) -> Result<Vec<Notification>> {
        let items = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, recipient_id, recipient_role, sender_id, notification_type, title, message,
                   action_url, related_post, related_event, related_opportunity,
                   is_read, read_at, is_deleted, created_at
            FROM notifications
            WHERE recipient_id = $1
              AND is_deleted = FALSE
              AND ($2::VARCHAR IS NULL OR notification_type = $2)
              AND ($3::BOOLEAN IS NULL OR is_read = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(recipient_id)
        .bind(filter.notification_type)
        .bind(filter.is_read)
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    pub async fn count(&self, recipient_id: &str, filter: NotificationFilter) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM notifications
            WHERE recipient_id = $1
              AND is_deleted = FALSE
              AND ($2::VARCHAR IS NULL OR notification_type = $2)
              AND ($3::BOOLEAN IS NULL OR is_read = $3)
            "#,
        )
        .bind(recipient_id)
        .bind(filter.notification_type)
        .bind(filter.is_read)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    pub async fn mark_read(
        &self,
        id: Uuid,
        recipient_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<Option<Notification>> {
        let updated = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, $3)
            WHERE id = $1 AND recipient_id = $2 AND is_deleted = FALSE
            RETURNING id, recipient_id, recipient_role, sender_id, notification_type, title,
                      message, action_url, related_post, related_event, related_opportunity,
                      is_read, read_at, is_deleted, created_at
            "#,
        )
        .bind(id)
        .bind(recipient_id)
        .bind(read_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }

    pub async fn mark_all_read(&self, recipient_id: &str, read_at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = $2
            WHERE recipient_id = $1 AND is_read = FALSE AND is_deleted = FALSE
            "#,
        )
        .bind(recipient_id)
        .bind(read_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn soft_delete(&self, id: Uuid, recipient_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_deleted = TRUE
            WHERE id = $1 AND recipient_id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn soft_delete_all(&self, recipient_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_deleted = TRUE
            WHERE recipient_id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn purge_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE is_read = TRUE AND created_at <= $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_by_type_since(
        &self,
        recipient_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TypeCount>> {
        let counts = sqlx::query_as::<_, TypeCount>(
            r#"
            SELECT notification_type, COUNT(*) AS count
            FROM notifications
            WHERE recipient_id = $1 AND created_at >= $2
            GROUP BY notification_type
            "#,
        )
        .bind(recipient_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }
}

#[async_trait]
impl NotificationRepositoryTrait for NotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        self.insert(notification).await
    }

    async fn list(
        &self,
        recipient_id: &str,
        filter: NotificationFilter,
        page: PageRequest,
    ) -> Result<Vec<Notification>> {
        self.list(recipient_id, filter, page).await
    }

    async fn count(&self, recipient_id: &str, filter: NotificationFilter) -> Result<u64> {
        self.count(recipient_id, filter).await
    }

    async fn mark_read(
        &self,
        id: Uuid,
        recipient_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<Option<Notification>> {
        self.mark_read(id, recipient_id, read_at).await
    }

    async fn mark_all_read(&self, recipient_id: &str, read_at: DateTime<Utc>) -> Result<u64> {
        self.mark_all_read(recipient_id, read_at).await
    }

    async fn soft_delete(&self, id: Uuid, recipient_id: &str) -> Result<bool> {
        self.soft_delete(id, recipient_id).await
    }

    async fn soft_delete_all(&self, recipient_id: &str) -> Result<u64> {
        self.soft_delete_all(recipient_id).await
    }

    async fn purge_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.purge_read_before(cutoff).await
    }

    async fn count_by_type_since(
        &self,
        recipient_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TypeCount>> {
        self.count_by_type_since(recipient_id, since).await
    }
}
