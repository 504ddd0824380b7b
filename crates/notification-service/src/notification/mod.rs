//! 通知模块
//!
//! 站内通知、推送和邮件的组合发送。
//!
//! ## 功能特性
//!
//! - **站内通知存储**：分页查询、已读、软删除、保留期清理
//! - **完整通知**：站内与推送两个渠道各自成败
//! - **模板目录**：业务事件到标题、正文、通知类型的映射
//! - **后台队列**：有界队列，不阻塞调用方
//! - **场景发送器**：活动提醒、职位推荐、导师、私信、周报
//!
//! ## 使用示例
//!
//! ```ignore
//! let request = SendCompleteRequest::new("u1", UserRole::Alumni, NotificationType::System, "Hi", "Welcome")
//!     .with_action_url("/notifications");
//! let result = service.send_complete(request).await;
//! ```

pub mod email;
pub mod queue;
pub mod sender;
pub mod service;
pub mod store;
pub mod template;
pub mod types;

pub use email::{
    BuiltinEmailRenderer, EmailSender, EmailTemplate, LogEmailSender, RenderedEmail,
    TemplateRenderer,
};
pub use queue::{NotificationJob, NotificationQueue};
pub use sender::{
    DigestOutcome, JobAlert, JobAlertReport, MentorshipEvent, NotificationSender,
    ReminderBatchReport, SenderOptions,
};
pub use service::NotificationService;
pub use store::NotificationStore;
pub use template::{RenderedTemplate, TemplateEngine, TemplateKind, truncate_preview};
pub use types::{
    BatchNotificationRequest, BatchNotificationResult, CompleteNotificationResult, DigestSummary,
    NotificationContext, Recipient, SendCompleteRequest, WeeklyStats,
};
