//! 内存仓储
//!
//! 使用 DashMap 实现的内存版仓储，与 PostgreSQL 仓储实现同一组 trait，
//! 适用于测试和本地开发环境。

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::traits::{
    EventRepositoryTrait, NotificationRepositoryTrait, TickerRepositoryTrait, UserRepositoryTrait,
};
use crate::error::Result;
use crate::models::{
    EventRecord, ManualTickerItem, Notification, NotificationFilter, OpportunitySummary,
    PageRequest, PushTokenEntry, ReminderOffset, TypeCount, UpcomingEvent, UserRecord, UserRole,
};

/// 通用内存存储
///
/// 克隆后共享同一份数据，测试中可以一边注入服务一边检查内容。
pub struct MemoryStore<K, T> {
    data: Arc<DashMap<K, T>>,
}

impl<K: Eq + Hash, T> fmt::Debug for MemoryStore<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.data.len())
            .finish()
    }
}

impl<K: Eq + Hash, T: Clone> Default for MemoryStore<K, T> {
    fn default() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }
}

impl<K, T> Clone for MemoryStore<K, T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K: Eq + Hash, T: Clone> MemoryStore<K, T> {
    pub fn insert(&self, key: K, value: T) {
        self.data.insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<T> {
        self.data.get(key).map(|v| v.clone())
    }

    pub fn list_by<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.data
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// 对满足条件的条目原地修改，返回被修改的条目数
    ///
    /// `update` 返回 false 表示该条目实际上没有变化。
    pub fn update_where<P, U>(&self, predicate: P, mut update: U) -> u64
    where
        P: Fn(&T) -> bool,
        U: FnMut(&mut T) -> bool,
    {
        let mut modified = 0;
        for mut entry in self.data.iter_mut() {
            if predicate(entry.value()) && update(entry.value_mut()) {
                modified += 1;
            }
        }
        modified
    }

    pub fn retain<F>(&self, mut keep: F) -> u64
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.data.len();
        self.data.retain(|_, v| keep(v));
        (before - self.data.len()) as u64
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }
}

// ==================== 用户目录 ====================

#[derive(Debug, Clone, Default)]
pub struct MemoryUserRepository {
    users: MemoryStore<String, UserRecord>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, user: UserRecord) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn token_of(&self, user_id: &str) -> Option<String> {
        self.users
            .get(&user_id.to_string())
            .and_then(|u| u.push_token)
    }
}

#[async_trait]
impl UserRepositoryTrait for MemoryUserRepository {
    async fn get_user(&self, user_id: &str, role: UserRole) -> Result<Option<UserRecord>> {
        Ok(self
            .users
            .get(&user_id.to_string())
            .filter(|u| u.role == role))
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.get(&user_id.to_string()))
    }

    async fn find_push_tokens(&self, user_ids: &[String]) -> Result<Vec<PushTokenEntry>> {
        Ok(user_ids
            .iter()
            .filter_map(|id| self.users.get(id))
            .filter_map(|u| {
                let token = u.push_token.filter(|t| !t.is_empty())?;
                Some(PushTokenEntry {
                    user_id: u.id,
                    role: u.role,
                    token,
                })
            })
            .collect())
    }

    async fn set_push_token(&self, user_id: &str, role: UserRole, token: &str) -> Result<bool> {
        let modified = self.users.update_where(
            |u| u.id == user_id && u.role == role,
            |u| {
                u.push_token = Some(token.to_string());
                true
            },
        );
        Ok(modified > 0)
    }

    async fn clear_push_token(&self, user_id: &str, role: UserRole) -> Result<bool> {
        let modified = self.users.update_where(
            |u| u.id == user_id && u.role == role,
            |u| u.push_token.take().is_some(),
        );
        Ok(modified > 0)
    }

    async fn clear_push_tokens(&self, tokens: &[String]) -> Result<u64> {
        Ok(self.users.update_where(
            |u| u.push_token.as_ref().is_some_and(|t| tokens.contains(t)),
            |u| u.push_token.take().is_some(),
        ))
    }

    async fn list_active_users(&self) -> Result<Vec<UserRecord>> {
        let mut users = self.users.list_by(|u| u.is_active);
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn list_reachable_user_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .users
            .list_by(|u| {
                u.is_active
                    && u.push_token.is_some()
                    && u.preferences
                        .as_ref()
                        .is_none_or(|p| p.push.enabled)
            })
            .into_iter()
            .map(|u| u.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

// ==================== 站内通知 ====================

#[derive(Debug, Clone, Default)]
pub struct MemoryNotificationRepository {
    notifications: MemoryStore<Uuid, Notification>,
}

impl MemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入（测试中用来构造历史数据）
    pub fn seed(&self, notification: Notification) {
        self.notifications.insert(notification.id, notification);
    }

    pub fn get(&self, id: Uuid) -> Option<Notification> {
        self.notifications.get(&id)
    }

    pub fn len(&self) -> usize {
        self.notifications.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn for_recipient(&self, recipient_id: &str) -> Vec<Notification> {
        self.notifications
            .list_by(|n| n.recipient_id == recipient_id)
    }
}

#[async_trait]
impl NotificationRepositoryTrait for MemoryNotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        self.notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn list(
        &self,
        recipient_id: &str,
        filter: NotificationFilter,
        page: PageRequest,
    ) -> Result<Vec<Notification>> {
        let mut items = self
            .notifications
            .list_by(|n| n.is_visible_to(recipient_id) && filter.matches(n));
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(items
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn count(&self, recipient_id: &str, filter: NotificationFilter) -> Result<u64> {
        Ok(self
            .notifications
            .list_by(|n| n.is_visible_to(recipient_id) && filter.matches(n))
            .len() as u64)
    }

    async fn mark_read(
        &self,
        id: Uuid,
        recipient_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<Option<Notification>> {
        let modified = self.notifications.update_where(
            |n| n.id == id && n.is_visible_to(recipient_id),
            |n| {
                n.is_read = true;
                n.read_at.get_or_insert(read_at);
                true
            },
        );

        Ok(if modified > 0 {
            self.notifications.get(&id)
        } else {
            None
        })
    }

    async fn mark_all_read(&self, recipient_id: &str, read_at: DateTime<Utc>) -> Result<u64> {
        Ok(self.notifications.update_where(
            |n| n.is_visible_to(recipient_id) && !n.is_read,
            |n| {
                n.is_read = true;
                n.read_at = Some(read_at);
                true
            },
        ))
    }

    async fn soft_delete(&self, id: Uuid, recipient_id: &str) -> Result<bool> {
        let modified = self.notifications.update_where(
            |n| n.id == id && n.is_visible_to(recipient_id),
            |n| {
                n.is_deleted = true;
                true
            },
        );
        Ok(modified > 0)
    }

    async fn soft_delete_all(&self, recipient_id: &str) -> Result<u64> {
        Ok(self.notifications.update_where(
            |n| n.is_visible_to(recipient_id),
            |n| {
                n.is_deleted = true;
                true
            },
        ))
    }

    async fn purge_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .notifications
            .retain(|n| !(n.is_read && n.created_at <= cutoff)))
    }

    async fn count_by_type_since(
        &self,
        recipient_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TypeCount>> {
        let mut counts: Vec<TypeCount> = Vec::new();
        for n in self
            .notifications
            .list_by(|n| n.recipient_id == recipient_id && n.created_at >= since)
        {
            match counts
                .iter_mut()
                .find(|c| c.notification_type == n.notification_type)
            {
                Some(c) => c.count += 1,
                None => counts.push(TypeCount {
                    notification_type: n.notification_type,
                    count: 1,
                }),
            }
        }
        counts.sort_by_key(|c| c.notification_type.as_str());
        Ok(counts)
    }
}

// ==================== 活动 ====================

#[derive(Debug, Clone, Default)]
pub struct MemoryEventRepository {
    events: MemoryStore<String, EventRecord>,
}

impl MemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, event: EventRecord) {
        self.events.insert(event.id.clone(), event);
    }

    pub fn get(&self, event_id: &str) -> Option<EventRecord> {
        self.events.get(&event_id.to_string())
    }
}

#[async_trait]
impl EventRepositoryTrait for MemoryEventRepository {
    async fn get_event(&self, event_id: &str) -> Result<Option<EventRecord>> {
        Ok(self.get(event_id))
    }

    async fn find_pending_reminders(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: ReminderOffset,
    ) -> Result<Vec<EventRecord>> {
        let mut events = self.events.list_by(|e| {
            !e.reminder_sent(offset) && e.starts_at >= start && e.starts_at <= end
        });
        events.sort_by_key(|e| e.starts_at);
        Ok(events)
    }

    async fn get_attendees(&self, event_id: &str) -> Result<Vec<String>> {
        Ok(self
            .get(event_id)
            .map(|e| e.attendee_ids)
            .unwrap_or_default())
    }

    /// DashMap 的写锁保证同一 key 上的检查与置位不可分割
    async fn try_mark_reminder_sent(&self, event_id: &str, offset: ReminderOffset) -> Result<bool> {
        let modified = self.events.update_where(
            |e| e.id == event_id,
            |e| e.mark_reminder_sent(offset),
        );
        Ok(modified > 0)
    }
}

// ==================== 公告栏 ====================

#[derive(Debug, Clone, Default)]
pub struct MemoryTickerRepository {
    manual: MemoryStore<String, ManualTickerItem>,
    events: MemoryStore<String, UpcomingEvent>,
    opportunities: MemoryStore<String, OpportunitySummary>,
}

impl MemoryTickerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_manual(&self, item: ManualTickerItem) {
        self.manual.insert(item.id.clone(), item);
    }

    pub fn add_event(&self, event: UpcomingEvent) {
        self.events.insert(event.id.clone(), event);
    }

    pub fn add_opportunity(&self, job: OpportunitySummary) {
        self.opportunities.insert(job.id.clone(), job);
    }
}

#[async_trait]
impl TickerRepositoryTrait for MemoryTickerRepository {
    async fn list_manual_items(&self, _now: DateTime<Utc>) -> Result<Vec<ManualTickerItem>> {
        let mut items = self.manual.list_by(|_| true);
        items.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn list_upcoming_events(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<UpcomingEvent>> {
        let mut events = self.events.list_by(|e| e.starts_at >= now);
        events.sort_by_key(|e| e.starts_at);
        events.truncate(limit as usize);
        Ok(events)
    }

    async fn list_recent_opportunities(&self, limit: u32) -> Result<Vec<OpportunitySummary>> {
        let mut jobs = self.opportunities.list_by(|_| true);
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewNotification, NotificationType};
    use chrono::Duration;

    #[tokio::test]
    async fn test_clear_tokens_leaves_other_users_untouched() {
        let repo = MemoryUserRepository::new();
        repo.upsert(UserRecord::new("a", UserRole::Alumni).with_push_token("tok-a"));
        repo.upsert(UserRecord::new("b", UserRole::Student).with_push_token("tok-b"));

        let cleared = repo.clear_push_tokens(&["tok-a".to_string()]).await.unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(repo.token_of("a"), None);
        assert_eq!(repo.token_of("b").as_deref(), Some("tok-b"));
    }

    #[test]
    fn test_debug_output_reports_entry_count() {
        let repo = MemoryUserRepository::new();
        repo.upsert(UserRecord::new("a", UserRole::Alumni));
        repo.upsert(UserRecord::new("b", UserRole::Student));

        let rendered = format!("{repo:?}");
        assert!(rendered.contains("MemoryUserRepository"));
        assert!(rendered.contains("len: 2"));
    }

    #[tokio::test]
    async fn test_get_user_checks_role() {
        let repo = MemoryUserRepository::new();
        repo.upsert(UserRecord::new("a", UserRole::Alumni));

        assert!(repo.get_user("a", UserRole::Alumni).await.unwrap().is_some());
        assert!(repo.get_user("a", UserRole::Student).await.unwrap().is_none());
        assert!(!repo.clear_push_token("missing", UserRole::Alumni).await.unwrap());
    }

    #[tokio::test]
    async fn test_try_mark_reminder_sent_only_once() {
        let repo = MemoryEventRepository::new();
        repo.upsert(EventRecord::new("e1", "Meetup", Utc::now()));

        assert!(repo.try_mark_reminder_sent("e1", ReminderOffset::OneHour).await.unwrap());
        assert!(!repo.try_mark_reminder_sent("e1", ReminderOffset::OneHour).await.unwrap());
        assert!(repo.try_mark_reminder_sent("e1", ReminderOffset::OneDay).await.unwrap());
        assert!(!repo.try_mark_reminder_sent("missing", ReminderOffset::OneDay).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_keeps_unread() {
        let repo = MemoryNotificationRepository::new();
        let now = Utc::now();
        let old = now - Duration::days(40);

        let mut read = NewNotification::new("u1", UserRole::Alumni, NotificationType::Like, "t", "m")
            .into_notification(old);
        read.is_read = true;
        let unread = NewNotification::new("u1", UserRole::Alumni, NotificationType::Like, "t", "m")
            .into_notification(old);
        repo.seed(read.clone());
        repo.seed(unread.clone());

        let purged = repo.purge_read_before(now - Duration::days(30)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(repo.get(read.id).is_none());
        assert!(repo.get(unread.id).is_some());
    }

    #[tokio::test]
    async fn test_count_by_type_since() {
        let repo = MemoryNotificationRepository::new();
        let now = Utc::now();
        for t in [NotificationType::Like, NotificationType::Like, NotificationType::Message] {
            repo.seed(NewNotification::new("u1", UserRole::Alumni, t, "t", "m").into_notification(now));
        }
        repo.seed(
            NewNotification::new("u1", UserRole::Alumni, NotificationType::Event, "t", "m")
                .into_notification(now - Duration::days(10)),
        );

        let counts = repo
            .count_by_type_since("u1", now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(TypeCount::count_of(&counts, NotificationType::Like), 2);
        assert_eq!(TypeCount::count_of(&counts, NotificationType::Message), 1);
        assert_eq!(TypeCount::count_of(&counts, NotificationType::Event), 0);
    }
}
