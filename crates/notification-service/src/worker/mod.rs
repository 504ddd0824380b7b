//! 后台任务
//!
//! - `reminder_worker`: 活动提醒与周报扫描
//! - `schedule`: 按 cron 触发各类扫描
//! - `retention_worker`: 已读通知过期清理

pub mod reminder_worker;
pub mod retention_worker;
pub mod schedule;

pub use reminder_worker::{ReminderScheduler, ScanKind, ScanSummary};
pub use retention_worker::RetentionWorker;
pub use schedule::{CronPlan, ScanTimer, next_fire, parse_cron};
