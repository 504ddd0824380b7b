//! 通知服务领域模型
//!
//! 包含用户、站内通知、活动提醒状态等核心实体定义

pub mod enums;
pub mod event;
pub mod notification;
pub mod ticker;
pub mod user;

// 重新导出常用类型
pub use enums::{DeliveryChannel, NotificationCategory, NotificationType, ReminderOffset, UserRole};
pub use event::EventRecord;
pub use notification::{
    NewNotification, Notification, NotificationFilter, NotificationPage, PageRequest, RelatedRefs,
    TypeCount,
};
pub use ticker::{ManualTickerItem, OpportunitySummary, TickerItem, TickerSource, UpcomingEvent};
pub use user::{ChannelPreferences, NotificationPreferences, PushTokenEntry, UserRecord};
