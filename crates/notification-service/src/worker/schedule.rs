//! 定时触发
//!
//! 每类扫描一个后台任务，按 cron 表达式（6 段，含秒）在配置的固定时区下计算
//! 下次触发时间。扫描在任务内串行执行，执行期间错过的触发点不会补跑。

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use alumni_shared::config::SchedulerConfig;
use alumni_shared::observability::metrics;

use super::reminder_worker::{ReminderScheduler, ScanKind};
use crate::error::{NotificationError, Result};

/// 单类扫描的触发计划
#[derive(Debug, Clone)]
pub struct CronPlan {
    pub kind: ScanKind,
    pub schedule: Schedule,
}

/// 解析 cron 表达式
pub fn parse_cron(expression: &str) -> Result<Schedule> {
    Schedule::from_str(expression).map_err(|e| {
        NotificationError::Validation(format!("无效的 cron 表达式 '{expression}': {e}"))
    })
}

/// 计算 `after` 之后的下一次触发时间（按 `timezone` 解释 cron）
pub fn next_fire(
    schedule: &Schedule,
    timezone: FixedOffset,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&timezone))
        .next()
        .map(|t| t.with_timezone(&Utc))
}

/// 扫描定时器
pub struct ScanTimer {
    scheduler: Arc<ReminderScheduler>,
    plans: Vec<CronPlan>,
    timezone: FixedOffset,
}

impl ScanTimer {
    pub fn from_config(config: &SchedulerConfig, scheduler: Arc<ReminderScheduler>) -> Result<Self> {
        let timezone = config
            .timezone()
            .map_err(|e| NotificationError::Validation(e.to_string()))?;

        let plans = ScanKind::ALL
            .into_iter()
            .map(|kind| {
                let expression = match kind {
                    ScanKind::Hourly => &config.hourly_cron,
                    ScanKind::Daily => &config.daily_cron,
                    ScanKind::Weekly => &config.weekly_cron,
                };
                parse_cron(expression).map(|schedule| CronPlan { kind, schedule })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            scheduler,
            plans,
            timezone,
        })
    }

    pub fn plans(&self) -> &[CronPlan] {
        &self.plans
    }

    /// 为每类扫描启动一个后台任务，收到 shutdown 信号后退出
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.plans
            .into_iter()
            .map(|plan| {
                tokio::spawn(run_plan(
                    plan,
                    self.timezone,
                    self.scheduler.clone(),
                    shutdown.clone(),
                ))
            })
            .collect()
    }
}

async fn run_plan(
    plan: CronPlan,
    timezone: FixedOffset,
    scheduler: Arc<ReminderScheduler>,
    mut shutdown: watch::Receiver<bool>,
) {
    let worker = format!("reminder_{}", plan.kind.as_str());
    info!(scan = plan.kind.as_str(), schedule = %plan.schedule, "扫描定时器已启动");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = Utc::now();
        let Some(next) = next_fire(&plan.schedule, timezone, now) else {
            warn!(scan = plan.kind.as_str(), "cron 表达式没有后续触发时间，定时器退出");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        if !scheduler.run(plan.kind, Utc::now()).await {
            error!(scan = plan.kind.as_str(), "扫描未执行：上一次同类扫描尚未结束");
        }
        metrics::set_worker_last_run(&worker);
    }

    info!(scan = plan.kind.as_str(), "扫描定时器已停止");
}
