//! 活动提醒调度
//!
//! 三类扫描：
//! - 每小时：1 小时内开始的活动，以及 1 到 3 小时后开始的活动
//! - 每天：24 到 25 小时后开始的活动
//! - 每周：向所有活跃用户发送周报
//!
//! 每个活动的每个提前量只提醒一次。发送前先原子地占用提醒标记，
//! 占用失败说明已被本实例的上一次扫描或其他实例处理过，直接跳过。
//! 同一类扫描不会重叠执行，不同类扫描可以并行。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use alumni_shared::observability::metrics;

use crate::error::NotificationError;
use crate::models::{EventRecord, ReminderOffset};
use crate::notification::{DigestSummary, NotificationSender};
use crate::repository::EventRepositoryTrait;

/// 扫描类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanKind {
    Hourly,
    Daily,
    Weekly,
}

impl ScanKind {
    pub const ALL: [ScanKind; 3] = [Self::Hourly, Self::Daily, Self::Weekly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    /// 该扫描负责的提醒提前量
    pub fn offsets(&self) -> &'static [ReminderOffset] {
        match self {
            Self::Hourly => &[ReminderOffset::OneHour, ReminderOffset::ThreeHours],
            Self::Daily => &[ReminderOffset::OneDay],
            Self::Weekly => &[],
        }
    }
}

/// 一次提醒扫描的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    /// 落在窗口内且标记未置位的活动数
    pub matched: usize,
    /// 成功占用标记并发出提醒的活动数
    pub sent: usize,
    pub skipped_no_attendees: usize,
    /// 标记已被其他扫描占用
    pub already_claimed: usize,
    pub failed: usize,
    /// 收到提醒的参与者人数
    pub recipients_notified: usize,
}

impl ScanSummary {
    fn merge(&mut self, other: ScanSummary) {
        self.matched += other.matched;
        self.sent += other.sent;
        self.skipped_no_attendees += other.skipped_no_attendees;
        self.already_claimed += other.already_claimed;
        self.failed += other.failed;
        self.recipients_notified += other.recipients_notified;
    }
}

/// 活动提醒调度器
pub struct ReminderScheduler {
    events: Arc<dyn EventRepositoryTrait>,
    sender: Arc<NotificationSender>,
    hourly_guard: Mutex<()>,
    daily_guard: Mutex<()>,
    weekly_guard: Mutex<()>,
}

impl ReminderScheduler {
    pub fn new(events: Arc<dyn EventRepositoryTrait>, sender: Arc<NotificationSender>) -> Self {
        Self {
            events,
            sender,
            hourly_guard: Mutex::new(()),
            daily_guard: Mutex::new(()),
            weekly_guard: Mutex::new(()),
        }
    }

    fn guard(&self, kind: ScanKind) -> &Mutex<()> {
        match kind {
            ScanKind::Hourly => &self.hourly_guard,
            ScanKind::Daily => &self.daily_guard,
            ScanKind::Weekly => &self.weekly_guard,
        }
    }

    /// 执行一次指定类型的扫描
    ///
    /// 同类扫描正在执行时直接返回 false。
    pub async fn run(&self, kind: ScanKind, now: DateTime<Utc>) -> bool {
        match kind {
            ScanKind::Hourly => self.run_hourly_scan(now).await.is_some(),
            ScanKind::Daily => self.run_daily_scan(now).await.is_some(),
            ScanKind::Weekly => self.run_weekly_digest(now).await.is_some(),
        }
    }

    /// 每小时扫描，返回 None 表示上一次同类扫描尚未结束
    pub async fn run_hourly_scan(&self, now: DateTime<Utc>) -> Option<ScanSummary> {
        self.run_reminder_scan(ScanKind::Hourly, now).await
    }

    pub async fn run_daily_scan(&self, now: DateTime<Utc>) -> Option<ScanSummary> {
        self.run_reminder_scan(ScanKind::Daily, now).await
    }

    #[instrument(skip(self))]
    pub async fn run_weekly_digest(&self, now: DateTime<Utc>) -> Option<DigestSummary> {
        let Ok(_running) = self.guard(ScanKind::Weekly).try_lock() else {
            warn!("上一次周报任务仍在执行，跳过本次");
            return None;
        };

        let started = Instant::now();
        let summary = match self.sender.send_all_weekly_digests(now).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "周报任务执行失败");
                DigestSummary::default()
            }
        };
        metrics::record_reminder_scan(
            ScanKind::Weekly.as_str(),
            summary.success_count as u64,
            started.elapsed().as_secs_f64(),
        );
        Some(summary)
    }

    #[instrument(skip(self), fields(scan = kind.as_str()))]
    async fn run_reminder_scan(&self, kind: ScanKind, now: DateTime<Utc>) -> Option<ScanSummary> {
        let Ok(_running) = self.guard(kind).try_lock() else {
            warn!("上一次同类扫描仍在执行，跳过本次");
            return None;
        };

        let started = Instant::now();
        let mut summary = ScanSummary::default();
        for offset in kind.offsets() {
            summary.merge(self.scan_offset(*offset, now).await);
        }

        metrics::record_reminder_scan(
            kind.as_str(),
            summary.sent as u64,
            started.elapsed().as_secs_f64(),
        );
        info!(
            matched = summary.matched,
            sent = summary.sent,
            skipped_no_attendees = summary.skipped_no_attendees,
            already_claimed = summary.already_claimed,
            failed = summary.failed,
            recipients = summary.recipients_notified,
            "提醒扫描完成"
        );
        Some(summary)
    }

    /// 扫描单个提前量的窗口
    async fn scan_offset(&self, offset: ReminderOffset, now: DateTime<Utc>) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let (start, end) = offset.window(now);

        let events = match self.events.find_pending_reminders(start, end, offset).await {
            Ok(events) => events,
            Err(e) => {
                error!(offset = offset.as_str(), error = %e, "查询待提醒活动失败");
                summary.failed += 1;
                return summary;
            }
        };
        debug!(offset = offset.as_str(), count = events.len(), "待提醒活动");

        for event in &events {
            summary.matched += 1;
            match self.remind_event(event, offset).await {
                Ok(Some(notified)) => {
                    summary.sent += 1;
                    summary.recipients_notified += notified;
                }
                Ok(None) => summary.already_claimed += 1,
                Err(NotificationError::NoAttendees(_)) => summary.skipped_no_attendees += 1,
                Err(e) => {
                    // 单个活动失败不影响其他活动
                    error!(event_id = %event.id, offset = offset.as_str(), error = %e, "活动提醒失败");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// 处理单个活动，返回收到提醒的人数；None 表示标记已被占用
    async fn remind_event(
        &self,
        event: &EventRecord,
        offset: ReminderOffset,
    ) -> Result<Option<usize>, NotificationError> {
        let attendees = self.events.get_attendees(&event.id).await?;
        if attendees.is_empty() {
            debug!(event_id = %event.id, "活动没有参与者，跳过提醒");
            return Err(NotificationError::NoAttendees(event.id.clone()));
        }

        if !self.events.try_mark_reminder_sent(&event.id, offset).await? {
            debug!(event_id = %event.id, offset = offset.as_str(), "提醒标记已被占用");
            return Ok(None);
        }

        let report = self
            .sender
            .send_event_reminder(event, offset, &attendees)
            .await;
        Ok(Some(report.notified))
    }
}
