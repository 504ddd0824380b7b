//! 数据库仓储层
//!
//! 提供用户目录、站内通知、活动提醒状态和公告栏数据的访问接口，封装 SQL 操作细节。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 使用 SQLx 进行类型安全的数据库操作
//! - 幂等标记的置位在 SQL 中以条件更新完成，不在应用层先读后写
//! - 定义 trait 接口以支持 mock 测试，并提供内存实现

mod event_repo;
pub mod memory;
mod notification_repo;
mod ticker_repo;
mod traits;
mod user_repo;

pub use event_repo::EventRepository;
pub use memory::{
    MemoryEventRepository, MemoryNotificationRepository, MemoryTickerRepository,
    MemoryUserRepository,
};
pub use notification_repo::NotificationRepository;
pub use ticker_repo::TickerRepository;
pub use traits::*;
pub use user_repo::UserRepository;
