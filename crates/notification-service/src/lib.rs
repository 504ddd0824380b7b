//! 校友平台通知服务
//!
//! 负责站内通知、移动/Web 推送以及定时活动提醒的扇出。
//!
//! ## 核心功能
//!
//! - **推送投递**：按用户解析推送 token，单发、批量多播、主题广播，失效 token 自动清理
//! - **站内通知**：通知的创建、分页查询、已读、软删除，以及过期已读通知的清理
//! - **通知编排**：一次请求同时写站内通知并推送，两个渠道互不影响
//! - **模板目录**：按场景渲染标题和正文，内容预览自动截断
//! - **活动提醒**：按小时/按天扫描即将开始的活动，每个提醒窗口只发一次
//! - **周报**：每周汇总个人活动，按用户偏好推送和发邮件
//! - **公告栏**：合并运营条目、活动和机会，结果缓存
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `repository`: 数据库仓储层及内存实现
//! - `push`: 推送网关与调度
//! - `notification`: 站内通知、编排、模板与后台队列
//! - `worker`: 定时提醒与清理任务
//! - `ticker`: 公告栏

pub mod error;
pub mod models;
pub mod notification;
pub mod push;
pub mod repository;
pub mod ticker;
pub mod worker;

pub use error::{NotificationError, Result};
pub use models::*;
pub use notification::{
    NotificationQueue, NotificationSender, NotificationService, NotificationStore,
    SendCompleteRequest, TemplateEngine,
};
pub use push::{PushDispatcher, PushGateway, PushOutcome, PushPayload, TokenDirectory};
pub use ticker::TickerService;
pub use worker::{ReminderScheduler, RetentionWorker, ScanKind, ScanTimer};
