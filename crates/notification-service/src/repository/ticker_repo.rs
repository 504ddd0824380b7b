//! 公告栏数据来源仓储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::traits::TickerRepositoryTrait;
use crate::error::Result;
use crate::models::{ManualTickerItem, OpportunitySummary, UpcomingEvent};

pub struct TickerRepository {
    pool: PgPool,
}

impl TickerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_manual_items(&self, now: DateTime<Utc>) -> Result<Vec<ManualTickerItem>> {
        let items = sqlx::query_as::<_, ManualTickerItem>(
            r#"
            SELECT id, title, message, item_type, variant, action_url, action_label, icon, priority
            FROM ticker_items
            WHERE is_active = TRUE
              AND (starts_at IS NULL OR starts_at <= $1)
              AND (ends_at IS NULL OR ends_at >= $1)
            ORDER BY priority DESC, created_at DESC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    pub async fn list_upcoming_events(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<UpcomingEvent>> {
        let events = sqlx::query_as::<_, UpcomingEvent>(
            r#"
            SELECT id, title, event_type, starts_at, location
            FROM events
            WHERE starts_at >= $1
            ORDER BY starts_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    pub async fn list_recent_opportunities(&self, limit: u32) -> Result<Vec<OpportunitySummary>> {
        let jobs = sqlx::query_as::<_, OpportunitySummary>(
            r#"
            SELECT id, title, company, location, category, job_type, is_featured
            FROM opportunities
            WHERE status = 'active'
            ORDER BY is_featured DESC, created_at DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }
}

#[async_trait]
impl TickerRepositoryTrait for TickerRepository {
    async fn list_manual_items(&self, now: DateTime<Utc>) -> Result<Vec<ManualTickerItem>> {
        self.list_manual_items(now).await
    }

    async fn list_upcoming_events(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<UpcomingEvent>> {
        self.list_upcoming_events(now, limit).await
    }

    async fn list_recent_opportunities(&self, limit: u32) -> Result<Vec<OpportunitySummary>> {
        self.list_recent_opportunities(limit).await
    }
}
