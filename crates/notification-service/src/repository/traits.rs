//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    EventRecord, ManualTickerItem, Notification, NotificationFilter, OpportunitySummary,
    PageRequest, PushTokenEntry, ReminderOffset, TypeCount, UpcomingEvent, UserRecord, UserRole,
};

/// 用户目录接口
///
/// 校友和学生共用同一接口，角色只是查询条件。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepositoryTrait: Send + Sync {
    /// 按 id 和角色查询用户
    async fn get_user(&self, user_id: &str, role: UserRole) -> Result<Option<UserRecord>>;

    /// 按 id 查询用户，不区分角色
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>>;

    /// 批量解析推送 token，没有 token 的用户不出现在结果中
    async fn find_push_tokens(&self, user_ids: &[String]) -> Result<Vec<PushTokenEntry>>;

    /// 覆盖写入推送 token，返回用户是否存在
    async fn set_push_token(&self, user_id: &str, role: UserRole, token: &str) -> Result<bool>;

    /// 清除单个用户的推送 token，返回是否有记录被修改
    async fn clear_push_token(&self, user_id: &str, role: UserRole) -> Result<bool>;

    /// 按 token 值批量清除，返回被修改的用户数
    async fn clear_push_tokens(&self, tokens: &[String]) -> Result<u64>;

    /// 所有活跃用户（周报使用）
    async fn list_active_users(&self) -> Result<Vec<UserRecord>>;

    /// 打开了推送开关且有 token 的活跃用户 id（广播使用）
    async fn list_reachable_user_ids(&self) -> Result<Vec<String>>;
}

/// 站内通知仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepositoryTrait: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<()>;

    /// 未删除的通知，按创建时间倒序分页
    async fn list(
        &self,
        recipient_id: &str,
        filter: NotificationFilter,
        page: PageRequest,
    ) -> Result<Vec<Notification>>;

    async fn count(&self, recipient_id: &str, filter: NotificationFilter) -> Result<u64>;

    /// 仅当通知属于该接收人时才会更新
    async fn mark_read(
        &self,
        id: Uuid,
        recipient_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<Option<Notification>>;

    async fn mark_all_read(&self, recipient_id: &str, read_at: DateTime<Utc>) -> Result<u64>;

    async fn soft_delete(&self, id: Uuid, recipient_id: &str) -> Result<bool>;

    async fn soft_delete_all(&self, recipient_id: &str) -> Result<u64>;

    /// 物理删除创建时间早于 cutoff 的已读通知
    async fn purge_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// 统计某时间点之后的通知数量（按类型分组）
    async fn count_by_type_since(
        &self,
        recipient_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TypeCount>>;
}

/// 活动仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventRepositoryTrait: Send + Sync {
    async fn get_event(&self, event_id: &str) -> Result<Option<EventRecord>>;

    /// 开始时间落在 `[start, end]` 且该提前量提醒尚未发送的活动
    async fn find_pending_reminders(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: ReminderOffset,
    ) -> Result<Vec<EventRecord>>;

    async fn get_attendees(&self, event_id: &str) -> Result<Vec<String>>;

    /// 原子地把提醒标记从 false 置为 true
    ///
    /// 只有真正完成转换的调用方会得到 true，并发或重复调用得到 false。
    async fn try_mark_reminder_sent(&self, event_id: &str, offset: ReminderOffset) -> Result<bool>;
}

/// 公告栏数据来源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TickerRepositoryTrait: Send + Sync {
    /// 当前生效的运营条目
    async fn list_manual_items(&self, now: DateTime<Utc>) -> Result<Vec<ManualTickerItem>>;

    async fn list_upcoming_events(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<UpcomingEvent>>;

    async fn list_recent_opportunities(&self, limit: u32) -> Result<Vec<OpportunitySummary>>;
}
