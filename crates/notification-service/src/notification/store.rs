//! 站内通知存储
//!
//! 对仓储的一层薄封装：补齐分页默认值、校验接收人 id、把"记录不存在"
//! 统一转换为 `NotificationNotFound`，并负责按保留期清理已读通知。
//!
//! 只有接收人本人可以标记已读或删除，接收人不匹配与通知不存在不作区分。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use alumni_shared::config::NotificationConfig;
use alumni_shared::observability::metrics;

use super::types::WeeklyStats;
use crate::error::{NotificationError, Result};
use crate::models::{
    NewNotification, Notification, NotificationFilter, NotificationPage, NotificationType,
    PageRequest, TypeCount,
};
use crate::repository::NotificationRepositoryTrait;

/// 站内通知存储
pub struct NotificationStore {
    repo: Arc<dyn NotificationRepositoryTrait>,
    retention: Duration,
    default_page_size: u32,
    max_page_size: u32,
}

impl NotificationStore {
    pub fn new(repo: Arc<dyn NotificationRepositoryTrait>, config: &NotificationConfig) -> Self {
        Self {
            repo,
            retention: Duration::days(config.retention_days),
            default_page_size: config.default_page_size.max(1),
            max_page_size: config.max_page_size.max(1),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// 创建站内通知
    ///
    /// 只校验接收人 id 的格式，不检查接收人是否存在。
    #[instrument(skip(self, new), fields(recipient_id = %new.recipient_id))]
    pub async fn create(&self, new: NewNotification) -> Result<Notification> {
        if new.recipient_id.trim().is_empty() {
            return Err(NotificationError::Validation("接收人 id 不能为空".to_string()));
        }
        if new.title.trim().is_empty() {
            return Err(NotificationError::Validation("通知标题不能为空".to_string()));
        }

        let notification = new.into_notification(Utc::now());
        self.repo.insert(&notification).await?;

        metrics::record_in_app_created(notification.notification_type.as_str());
        debug!(notification_id = %notification.id, "站内通知已创建");
        Ok(notification)
    }

    /// 分页查询，未指定页码或条数时使用默认值，条数不超过上限
    pub async fn list(
        &self,
        recipient_id: &str,
        filter: NotificationFilter,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<NotificationPage> {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size);
        let request = PageRequest::new(page, limit);

        let items = self.repo.list(recipient_id, filter, request).await?;
        let total_count = self.repo.count(recipient_id, filter).await?;
        let unread_count = self.unread_count(recipient_id).await?;

        Ok(NotificationPage {
            items,
            total_count,
            unread_count,
            page,
            limit,
            total_pages: total_count.div_ceil(u64::from(limit)),
        })
    }

    pub async fn unread_count(&self, recipient_id: &str) -> Result<u64> {
        self.repo
            .count(
                recipient_id,
                NotificationFilter {
                    is_read: Some(false),
                    ..Default::default()
                },
            )
            .await
    }

    /// 标记单条已读，重复标记保持第一次的已读时间
    pub async fn mark_read(&self, id: Uuid, recipient_id: &str) -> Result<Notification> {
        self.repo
            .mark_read(id, recipient_id, Utc::now())
            .await?
            .ok_or(NotificationError::NotificationNotFound(id))
    }

    pub async fn mark_all_read(&self, recipient_id: &str) -> Result<u64> {
        let modified = self.repo.mark_all_read(recipient_id, Utc::now()).await?;
        info!(recipient_id, modified, "已全部标记为已读");
        Ok(modified)
    }

    pub async fn soft_delete(&self, id: Uuid, recipient_id: &str) -> Result<()> {
        if self.repo.soft_delete(id, recipient_id).await? {
            Ok(())
        } else {
            Err(NotificationError::NotificationNotFound(id))
        }
    }

    pub async fn soft_delete_all(&self, recipient_id: &str) -> Result<u64> {
        let deleted = self.repo.soft_delete_all(recipient_id).await?;
        info!(recipient_id, deleted, "已删除全部通知");
        Ok(deleted)
    }

    /// 物理删除超过保留期的已读通知，未读通知不受影响
    #[instrument(skip(self))]
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - self.retention;
        let purged = self.repo.purge_read_before(cutoff).await?;
        info!(purged, cutoff = %cutoff, "已清理过期的已读通知");
        Ok(purged)
    }

    /// 最近 7 天按类型统计的个人活动
    pub async fn weekly_stats(&self, recipient_id: &str, now: DateTime<Utc>) -> Result<WeeklyStats> {
        let counts = self
            .repo
            .count_by_type_since(recipient_id, now - Duration::days(7))
            .await?;

        Ok(WeeklyStats {
            new_messages: TypeCount::count_of(&counts, NotificationType::Message),
            post_likes: TypeCount::count_of(&counts, NotificationType::Like),
            post_comments: TypeCount::count_of(&counts, NotificationType::Comment),
            events_attending: TypeCount::count_of(&counts, NotificationType::Event),
            new_jobs: TypeCount::count_of(&counts, NotificationType::Opportunity),
        })
    }
}
