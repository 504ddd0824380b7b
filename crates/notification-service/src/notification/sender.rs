//! 通知发送器
//!
//! 提供业务场景的便捷发送接口：活动提醒、职位推荐、导师请求、私信、周报等。
//!
//! ## 设计说明
//!
//! - 每个场景先解析接收人，再按用户偏好决定推送、站内、邮件三个渠道
//! - 接收人不存在时跳过，不影响同批次的其他接收人
//! - 邮件失败只记日志，不影响推送和站内通知的结果

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use alumni_shared::config::AppConfig;

use super::email::{EmailSender, EmailTemplate, TemplateRenderer};
use super::service::NotificationService;
use super::template::{TemplateKind, truncate_preview};
use super::types::{
    CompleteNotificationResult, DigestSummary, NotificationContext, SendCompleteRequest, WeeklyStats,
};
use crate::error::{NotificationError, Result};
use crate::models::{
    DeliveryChannel, EventRecord, NotificationCategory, NotificationType, RelatedRefs,
    ReminderOffset, UserRecord, UserRole,
};
use crate::push::{PushOutcome, PushPayload, TopicOutcome};
use crate::repository::UserRepositoryTrait;

/// 发送器参数
#[derive(Debug, Clone)]
pub struct SenderOptions {
    /// 周报逐个用户之间的间隔
    pub digest_pacing: StdDuration,
    pub announcement_topic: String,
    /// 私信邮件只发给超过该时长未活跃的用户
    pub message_email_idle: Duration,
    pub email_enabled: bool,
    /// 邮件中的日期按该时区展示
    pub timezone: FixedOffset,
    pub preview_max_chars: usize,
}

impl Default for SenderOptions {
    fn default() -> Self {
        Self {
            digest_pacing: StdDuration::from_millis(100),
            announcement_topic: "announcements".to_string(),
            message_email_idle: Duration::hours(1),
            email_enabled: true,
            timezone: Utc.fix(),
            preview_max_chars: 50,
        }
    }
}

impl SenderOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timezone = config
            .scheduler
            .timezone()
            .map_err(|e| NotificationError::Validation(e.to_string()))?;
        Ok(Self {
            digest_pacing: config.scheduler.digest_pacing(),
            announcement_topic: config.push.announcement_topic.clone(),
            message_email_idle: Duration::hours(1),
            email_enabled: config.email.enabled,
            timezone,
            preview_max_chars: config.notifications.preview_max_chars,
        })
    }
}

/// 一批活动提醒的发送统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderBatchReport {
    pub attendees: usize,
    pub notified: usize,
    pub push_delivered: usize,
    pub emails_sent: usize,
    pub skipped_missing: usize,
    pub skipped_by_preference: usize,
}

/// 职位信息（职位推荐使用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAlert {
    pub id: String,
    pub title: String,
    pub company: String,
    pub is_internship: bool,
}

impl JobAlert {
    pub fn action_url(&self) -> String {
        format!("/opportunities/{}", self.id)
    }
}

/// 职位推荐发送统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAlertReport {
    pub total: usize,
    pub notified: usize,
    pub skipped: usize,
}

/// 导师通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentorshipEvent {
    Request,
    Accepted,
}

/// 单个用户的周报结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOutcome {
    Sent(WeeklyStats),
    /// 用户关闭了周报
    Skipped,
}

/// 各渠道是否放行
#[derive(Debug, Clone, Copy)]
struct ChannelGate {
    push: bool,
    in_app: bool,
    email: bool,
}

impl ChannelGate {
    fn for_user(user: &UserRecord, category: NotificationCategory) -> Self {
        Self {
            push: user.should_send(category, DeliveryChannel::Push),
            in_app: user.should_send(category, DeliveryChannel::InApp),
            email: user.email.is_some() && user.should_send(category, DeliveryChannel::Email),
        }
    }

    fn any_realtime(&self) -> bool {
        self.push || self.in_app
    }
}

/// 通知发送器
#[derive(Clone)]
pub struct NotificationSender {
    service: Arc<NotificationService>,
    users: Arc<dyn UserRepositoryTrait>,
    email: Arc<dyn EmailSender>,
    renderer: Arc<dyn TemplateRenderer>,
    options: SenderOptions,
}

impl NotificationSender {
    pub fn new(
        service: Arc<NotificationService>,
        users: Arc<dyn UserRepositoryTrait>,
        email: Arc<dyn EmailSender>,
        renderer: Arc<dyn TemplateRenderer>,
        options: SenderOptions,
    ) -> Self {
        Self {
            service,
            users,
            email,
            renderer,
            options,
        }
    }

    pub fn service(&self) -> &Arc<NotificationService> {
        &self.service
    }

    /// 向活动参与者发送一批提醒
    ///
    /// 参与者由调用方给出，单个参与者失败不影响其他人。
    #[instrument(skip(self, event, attendees), fields(event_id = %event.id, offset = offset.as_str()))]
    pub async fn send_event_reminder(
        &self,
        event: &EventRecord,
        offset: ReminderOffset,
        attendees: &[String],
    ) -> ReminderBatchReport {
        let mut report = ReminderBatchReport {
            attendees: attendees.len(),
            ..Default::default()
        };
        let context = NotificationContext::new()
            .with("event_title", &event.title)
            .with("time_until", offset.time_until_label())
            .with("event_date", self.format_time(event.starts_at))
            .with("action_url", event.action_url());

        for attendee_id in attendees {
            let user = match self.users.find_user(attendee_id).await {
                Ok(Some(user)) if user.is_active => user,
                Ok(_) => {
                    debug!(attendee_id = %attendee_id, "参与者不存在或已停用，跳过提醒");
                    report.skipped_missing += 1;
                    continue;
                }
                Err(e) => {
                    warn!(attendee_id = %attendee_id, error = %e, "查询参与者失败，跳过提醒");
                    report.skipped_missing += 1;
                    continue;
                }
            };

            let gate = ChannelGate::for_user(&user, NotificationCategory::Events);
            if !gate.any_realtime() && !gate.email {
                report.skipped_by_preference += 1;
                continue;
            }

            if gate.any_realtime() {
                let result = self
                    .send_templated(
                        TemplateKind::EventReminder,
                        &context,
                        &user,
                        gate,
                        |request| {
                            request
                                .with_action_url(event.action_url())
                                .with_related(RelatedRefs::event(&event.id))
                        },
                    )
                    .await;
                if let Some(result) = result {
                    if result.any_delivered() {
                        report.notified += 1;
                    }
                    if result.push.as_ref().is_some_and(|p| p.success) {
                        report.push_delivered += 1;
                    }
                }
            }

            if gate.email {
                let context = context.clone().with("user_name", user.full_name());
                if self
                    .send_email(&user, EmailTemplate::EventReminder, &context)
                    .await
                {
                    report.emails_sent += 1;
                }
            }
        }

        info!(
            attendees = report.attendees,
            notified = report.notified,
            emails = report.emails_sent,
            skipped_missing = report.skipped_missing,
            skipped_by_preference = report.skipped_by_preference,
            "活动提醒已发送"
        );
        report
    }

    /// 职位推荐
    ///
    /// 指定了接收人时只发给这些人，否则广播给所有打开推送的用户。
    #[instrument(skip(self, job, recipients), fields(job_id = %job.id))]
    pub async fn send_job_alert(
        &self,
        job: &JobAlert,
        recipients: Option<&[String]>,
    ) -> Result<JobAlertReport> {
        let targets = match recipients {
            Some(ids) => ids.to_vec(),
            None => self.users.list_reachable_user_ids().await?,
        };
        let kind = if job.is_internship {
            TemplateKind::InternshipPosted
        } else {
            TemplateKind::NewJobPosted
        };
        let context = NotificationContext::new()
            .with("job_title", &job.title)
            .with("company", &job.company)
            .with("action_url", job.action_url());

        let mut report = JobAlertReport {
            total: targets.len(),
            ..Default::default()
        };
        for user_id in &targets {
            let Some(user) = self.resolve_active(user_id).await else {
                report.skipped += 1;
                continue;
            };
            let gate = ChannelGate::for_user(&user, NotificationCategory::Jobs);
            if !gate.any_realtime() && !gate.email {
                report.skipped += 1;
                continue;
            }

            if gate.any_realtime() {
                self.send_templated(kind, &context, &user, gate, |request| {
                    request
                        .with_action_url(job.action_url())
                        .with_related(RelatedRefs::opportunity(&job.id))
                })
                .await;
            }
            if gate.email {
                let context = context.clone().with("user_name", user.full_name());
                self.send_email(&user, EmailTemplate::NewJob, &context).await;
            }
            report.notified += 1;
        }

        info!(
            total = report.total,
            notified = report.notified,
            skipped = report.skipped,
            "职位推荐已发送"
        );
        Ok(report)
    }

    /// 导师请求或接受通知
    ///
    /// 请求发给导师，接受发给学员；`custom_message` 覆盖模板正文。
    #[instrument(skip(self, custom_message))]
    pub async fn send_mentorship(
        &self,
        event: MentorshipEvent,
        recipient_id: &str,
        sender_id: &str,
        custom_message: Option<&str>,
    ) -> Result<CompleteNotificationResult> {
        let recipient = self.require_user(recipient_id).await?;
        let sender = self.require_user(sender_id).await?;

        let kind = match event {
            MentorshipEvent::Request => TemplateKind::MentorshipRequest,
            MentorshipEvent::Accepted => TemplateKind::MentorshipAccepted,
        };
        let action_url = format!("/profile/{sender_id}");
        let context = NotificationContext::new()
            .with("sender_name", sender.full_name())
            .with("action_url", &action_url);

        let gate = ChannelGate::for_user(&recipient, NotificationCategory::Mentorship);
        let mut request = self
            .service
            .templated_request(kind, &context, &recipient.id, recipient.role)?
            .with_sender(sender_id)
            .with_action_url(&action_url)
            .with_channels(gate.push, gate.in_app);
        if let Some(message) = custom_message.filter(|m| !m.trim().is_empty()) {
            request.message = message.to_string();
        }

        let email_context = context
            .with("user_name", recipient.full_name())
            .with("title", &request.title)
            .with("message", &request.message);
        let result = self.service.send_complete(request).await;

        if gate.email {
            self.send_email(&recipient, EmailTemplate::Mentorship, &email_context)
                .await;
        }
        Ok(result)
    }

    /// 私信通知
    ///
    /// 邮件只发给超过一小时未活跃的接收人。
    #[instrument(skip(self, preview))]
    pub async fn send_message_notification(
        &self,
        recipient_id: &str,
        sender_id: &str,
        conversation_id: &str,
        preview: &str,
        now: DateTime<Utc>,
    ) -> Result<CompleteNotificationResult> {
        let recipient = self.require_user(recipient_id).await?;
        let sender_name = match self.users.find_user(sender_id).await? {
            Some(sender) => sender.full_name(),
            None => "Someone".to_string(),
        };

        let action_url = format!("/messages/{conversation_id}");
        let context = NotificationContext::new()
            .with("sender_name", &sender_name)
            .with("preview", preview)
            .with("action_url", &action_url);

        let gate = ChannelGate::for_user(&recipient, NotificationCategory::Messages);
        let request = self
            .service
            .templated_request(TemplateKind::NewMessage, &context, &recipient.id, recipient.role)?
            .with_sender(sender_id)
            .with_action_url(&action_url)
            .with_channels(gate.push, gate.in_app);
        let result = self.service.send_complete(request).await;

        if gate.email && recipient.is_idle_for(now, self.options.message_email_idle) {
            let context = context
                .with("user_name", recipient.full_name())
                .with(
                    "preview",
                    truncate_preview(preview, self.options.preview_max_chars),
                );
            self.send_email(&recipient, EmailTemplate::NewMessage, &context)
                .await;
        }
        Ok(result)
    }

    /// 单个用户的周报
    ///
    /// 统计最近 7 天的通知数量，生成一条站内通知并按偏好推送和发邮件。
    pub async fn send_weekly_digest(
        &self,
        user: &UserRecord,
        now: DateTime<Utc>,
    ) -> Result<DigestOutcome> {
        let gate = ChannelGate::for_user(user, NotificationCategory::WeeklyDigest);
        if !gate.push && !gate.email {
            debug!(user_id = %user.id, "用户关闭了周报");
            return Ok(DigestOutcome::Skipped);
        }

        let stats = self.service.store().weekly_stats(&user.id, now).await?;
        let message = format!(
            "This week: {} messages, {} likes, {} comments, {} event updates, {} new opportunities",
            stats.new_messages, stats.post_likes, stats.post_comments, stats.events_attending,
            stats.new_jobs
        );
        let request = SendCompleteRequest::new(
            &user.id,
            user.role,
            NotificationType::System,
            "Your Weekly Digest",
            message,
        )
        .with_action_url("/notifications")
        .with_channels(gate.push, gate.in_app);
        self.service.send_complete(request).await;

        if gate.email && self.options.email_enabled {
            let context = NotificationContext::new()
                .with("user_name", user.full_name())
                .with("new_messages", stats.new_messages.to_string())
                .with("post_likes", stats.post_likes.to_string())
                .with("post_comments", stats.post_comments.to_string())
                .with("events_attending", stats.events_attending.to_string())
                .with("new_jobs", stats.new_jobs.to_string());
            if !self
                .send_email(user, EmailTemplate::WeeklyDigest, &context)
                .await
            {
                return Err(NotificationError::Email(format!(
                    "周报邮件发送失败: user_id={}",
                    user.id
                )));
            }
        }

        Ok(DigestOutcome::Sent(stats))
    }

    /// 所有活跃用户的周报，用户之间按配置间隔发送
    #[instrument(skip(self))]
    pub async fn send_all_weekly_digests(&self, now: DateTime<Utc>) -> Result<DigestSummary> {
        let users = self.users.list_active_users().await?;
        let mut summary = DigestSummary {
            total_users: users.len(),
            ..Default::default()
        };

        for (i, user) in users.iter().enumerate() {
            if i > 0 && !self.options.digest_pacing.is_zero() {
                tokio::time::sleep(self.options.digest_pacing).await;
            }
            match self.send_weekly_digest(user, now).await {
                Ok(_) => summary.success_count += 1,
                Err(e) => {
                    warn!(user_id = %user.id, error = %e, "周报发送失败");
                    summary.failure_count += 1;
                }
            }
        }

        info!(
            total = summary.total_users,
            success = summary.success_count,
            failure = summary.failure_count,
            "周报批量发送完成"
        );
        Ok(summary)
    }

    /// 测试通知，只走推送和站内两个渠道，忽略偏好
    pub async fn send_test_notification(
        &self,
        user_id: &str,
    ) -> Result<CompleteNotificationResult> {
        let user = self.require_user(user_id).await?;
        let request = SendCompleteRequest::new(
            &user.id,
            user.role,
            NotificationType::System,
            "Test Notification",
            "This is a test notification from Alumni Connect",
        )
        .with_action_url("/notifications");
        Ok(self.service.send_complete(request).await)
    }

    /// 注册推送 token 并订阅公告主题
    ///
    /// 主题订阅失败不影响注册结果。
    pub async fn register_token(
        &self,
        user_id: &str,
        role: UserRole,
        token: &str,
    ) -> Result<TopicOutcome> {
        let push = self.service.push();
        push.tokens().register_token(user_id, role, token).await?;
        Ok(push
            .subscribe(token.trim(), &self.options.announcement_topic)
            .await)
    }

    /// 通过公告主题广播
    pub async fn broadcast_announcement(&self, title: &str, message: &str) -> PushOutcome {
        let payload = PushPayload::new(title, message)
            .with_data("type", NotificationType::System.as_str())
            .with_action_url("/notifications");
        self.service
            .push()
            .send_topic(&self.options.announcement_topic, &payload)
            .await
    }

    async fn send_templated<F>(
        &self,
        kind: TemplateKind,
        context: &NotificationContext,
        user: &UserRecord,
        gate: ChannelGate,
        customize: F,
    ) -> Option<CompleteNotificationResult>
    where
        F: FnOnce(SendCompleteRequest) -> SendCompleteRequest,
    {
        match self
            .service
            .templated_request(kind, context, &user.id, user.role)
        {
            Ok(request) => {
                let request = customize(request).with_channels(gate.push, gate.in_app);
                Some(self.service.send_complete(request).await)
            }
            Err(e) => {
                error!(user_id = %user.id, error = %e, "通知模板渲染失败");
                None
            }
        }
    }

    /// 渲染并发送邮件，返回是否成功
    async fn send_email(
        &self,
        user: &UserRecord,
        template: EmailTemplate,
        context: &NotificationContext,
    ) -> bool {
        if !self.options.email_enabled {
            return false;
        }
        let Some(to) = user.email.as_deref() else {
            return false;
        };

        let rendered = match self.renderer.render(template, context) {
            Ok(rendered) => rendered,
            Err(e) => {
                error!(user_id = %user.id, ?template, error = %e, "邮件模板渲染失败");
                return false;
            }
        };

        match self
            .email
            .send_email(to, &rendered.subject, &rendered.html)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(user_id = %user.id, ?template, error = %e, "邮件发送失败");
                false
            }
        }
    }

    async fn resolve_active(&self, user_id: &str) -> Option<UserRecord> {
        match self.users.find_user(user_id).await {
            Ok(Some(user)) if user.is_active => Some(user),
            Ok(_) => None,
            Err(e) => {
                warn!(user_id, error = %e, "查询用户失败");
                None
            }
        }
    }

    async fn require_user(&self, user_id: &str) -> Result<UserRecord> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| NotificationError::RecipientNotFound(user_id.to_string()))
    }

    fn format_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.options.timezone)
            .format("%Y-%m-%d %H:%M")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelPreferences, NotificationPreferences};
    use crate::notification::email::{BuiltinEmailRenderer, MockEmailSender};
    use crate::notification::store::NotificationStore;
    use crate::notification::template::TemplateEngine;
    use crate::push::gateway::MockPushGateway;
    use crate::push::{PushDispatcher, PushOptions, TokenDirectory};
    use crate::repository::{MemoryNotificationRepository, MemoryUserRepository};
    use alumni_shared::config::NotificationConfig;

    struct Fixture {
        sender: NotificationSender,
        users: MemoryUserRepository,
        notifications: MemoryNotificationRepository,
    }

    fn fixture(gateway: MockPushGateway, email: MockEmailSender) -> Fixture {
        let users = MemoryUserRepository::new();
        let notifications = MemoryNotificationRepository::new();
        let push = Arc::new(PushDispatcher::new(
            Arc::new(gateway),
            Arc::new(TokenDirectory::new(Arc::new(users.clone()))),
            PushOptions::default(),
        ));
        let store = Arc::new(NotificationStore::new(
            Arc::new(notifications.clone()),
            &NotificationConfig::default(),
        ));
        let service = Arc::new(NotificationService::new(
            store,
            push,
            Arc::new(TemplateEngine::default()),
        ));
        let sender = NotificationSender::new(
            service,
            Arc::new(users.clone()),
            Arc::new(email),
            Arc::new(BuiltinEmailRenderer::new("https://alumni.example")),
            SenderOptions {
                digest_pacing: StdDuration::ZERO,
                ..Default::default()
            },
        );
        Fixture {
            sender,
            users,
            notifications,
        }
    }

    fn no_email_for(category: NotificationCategory) -> NotificationPreferences {
        let mut prefs = NotificationPreferences::default();
        match category {
            NotificationCategory::WeeklyDigest => prefs.email.weekly_digest = false,
            NotificationCategory::Events => prefs.email.events = false,
            _ => prefs.email = ChannelPreferences::disabled(),
        }
        prefs
    }

    #[tokio::test]
    async fn test_event_reminder_skips_missing_attendee() {
        let mut email = MockEmailSender::new();
        email
            .expect_send_email()
            .withf(|to, subject, _| to == "a@x.io" && subject.contains("Homecoming"))
            .times(1)
            .returning(|_, _, _| Ok("e1".to_string()));
        let mut gateway = MockPushGateway::new();
        gateway.expect_send().never();

        let f = fixture(gateway, email);
        f.users.upsert(
            UserRecord::new("a", UserRole::Alumni)
                .with_name("Ada", "L")
                .with_email("a@x.io"),
        );

        let event = EventRecord::new("e1", "Homecoming", Utc::now() + Duration::minutes(40));
        let report = f
            .sender
            .send_event_reminder(
                &event,
                ReminderOffset::OneHour,
                &["a".to_string(), "ghost".to_string()],
            )
            .await;

        assert_eq!(report.attendees, 2);
        assert_eq!(report.notified, 1);
        assert_eq!(report.skipped_missing, 1);
        assert_eq!(report.emails_sent, 1);

        let stored = f.notifications.for_recipient("a");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].message, "\"Homecoming\" starts in 1 hour");
        assert_eq!(stored[0].action_url.as_deref(), Some("/events/e1"));
    }

    #[tokio::test]
    async fn test_event_reminder_honours_email_preference() {
        let mut email = MockEmailSender::new();
        email.expect_send_email().never();

        let f = fixture(MockPushGateway::new(), email);
        f.users.upsert(
            UserRecord::new("a", UserRole::Student)
                .with_email("a@x.io")
                .with_preferences(no_email_for(NotificationCategory::Events)),
        );

        let event = EventRecord::new("e1", "Career Fair", Utc::now() + Duration::hours(2));
        let report = f
            .sender
            .send_event_reminder(&event, ReminderOffset::ThreeHours, &["a".to_string()])
            .await;
        assert_eq!(report.notified, 1);
        assert_eq!(report.emails_sent, 0);
    }

    #[tokio::test]
    async fn test_message_email_only_when_idle() {
        let mut email = MockEmailSender::new();
        email
            .expect_send_email()
            .withf(|to, _, _| to == "idle@x.io")
            .times(1)
            .returning(|_, _, _| Ok("e1".to_string()));

        let f = fixture(MockPushGateway::new(), email);
        let now = Utc::now();
        f.users.upsert(
            UserRecord::new("idle", UserRole::Alumni)
                .with_email("idle@x.io")
                .with_last_active_at(now - Duration::hours(2)),
        );
        f.users.upsert(
            UserRecord::new("busy", UserRole::Alumni)
                .with_email("busy@x.io")
                .with_last_active_at(now - Duration::minutes(5)),
        );
        f.users
            .upsert(UserRecord::new("s", UserRole::Student).with_name("Sam", "Lee"));

        for recipient in ["idle", "busy"] {
            let result = f
                .sender
                .send_message_notification(recipient, "s", "c1", "hello there", now)
                .await
                .unwrap();
            let in_app = result.in_app.unwrap();
            assert_eq!(in_app.message, "Sam Lee: hello there");
            assert_eq!(in_app.action_url.as_deref(), Some("/messages/c1"));
        }
    }

    #[tokio::test]
    async fn test_mentorship_custom_message() {
        let f = fixture(MockPushGateway::new(), MockEmailSender::new());
        f.users
            .upsert(UserRecord::new("mentor", UserRole::Alumni).with_name("Grace", "H"));
        f.users
            .upsert(UserRecord::new("mentee", UserRole::Student).with_name("Alan", "T"));

        let result = f
            .sender
            .send_mentorship(MentorshipEvent::Request, "mentor", "mentee", Some("Please!"))
            .await
            .unwrap();
        let in_app = result.in_app.unwrap();
        assert_eq!(in_app.title, "Mentorship Request");
        assert_eq!(in_app.message, "Please!");
        assert_eq!(in_app.sender_id.as_deref(), Some("mentee"));
        assert_eq!(in_app.action_url.as_deref(), Some("/profile/mentee"));

        let err = f
            .sender
            .send_mentorship(MentorshipEvent::Accepted, "ghost", "mentor", None)
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::RecipientNotFound(_)));
    }

    #[tokio::test]
    async fn test_job_alert_to_explicit_recipients() {
        let f = fixture(MockPushGateway::new(), MockEmailSender::new());
        f.users.upsert(UserRecord::new("a", UserRole::Student));
        f.users.upsert(UserRecord::new("b", UserRole::Student).inactive());

        let job = JobAlert {
            id: "j1".to_string(),
            title: "Data Intern".to_string(),
            company: "Acme".to_string(),
            is_internship: true,
        };
        let report = f
            .sender
            .send_job_alert(&job, Some(&["a".to_string(), "b".to_string()]))
            .await
            .unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.notified, 1);
        assert_eq!(report.skipped, 1);

        let stored = f.notifications.for_recipient("a");
        assert_eq!(stored[0].title, "New Internship");
        assert_eq!(stored[0].related.opportunity.as_deref(), Some("j1"));
    }

    #[tokio::test]
    async fn test_weekly_digests_summary() {
        let mut email = MockEmailSender::new();
        email
            .expect_send_email()
            .returning(|to, _, _| {
                if to == "bad@x.io" {
                    Err(NotificationError::Email("bounced".to_string()))
                } else {
                    Ok("e".to_string())
                }
            });

        let f = fixture(MockPushGateway::new(), email);
        f.users
            .upsert(UserRecord::new("ok", UserRole::Alumni).with_email("ok@x.io"));
        f.users
            .upsert(UserRecord::new("bad", UserRole::Alumni).with_email("bad@x.io"));
        f.users.upsert(
            UserRecord::new("off", UserRole::Student)
                .with_email("off@x.io")
                .with_preferences({
                    let mut prefs = no_email_for(NotificationCategory::WeeklyDigest);
                    prefs.push.weekly_digest = false;
                    prefs
                }),
        );

        let summary = f.sender.send_all_weekly_digests(Utc::now()).await.unwrap();
        assert_eq!(summary.total_users, 3);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 1);
    }
}
