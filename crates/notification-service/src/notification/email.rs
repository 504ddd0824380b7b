//! 邮件协作方
//!
//! 邮件的渲染和投递都在本子系统之外，这里只定义两个窄接口：
//! `TemplateRenderer` 把模板和数据渲染为主题与 HTML，`EmailSender` 负责投递。
//! 内置实现分别是基于 `{{variable}}` 替换的渲染器和只记日志的模拟发送器，
//! 生产环境需要接入真实的邮件服务。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::template::TemplateEngine;
use super::types::NotificationContext;
use crate::error::{NotificationError, Result};

/// 邮件模板
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    EventReminder,
    WeeklyDigest,
    NewJob,
    Mentorship,
    NewMessage,
    Test,
}

/// 渲染后的邮件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// 邮件模板渲染接口
#[cfg_attr(test, mockall::automock)]
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: EmailTemplate, context: &NotificationContext) -> Result<RenderedEmail>;
}

/// 邮件发送接口，成功时返回邮件服务的消息 ID
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<String>;
}

/// 模拟邮件发送器
///
/// 只记录日志并返回生成的消息 ID，用于未配置邮件服务的环境。
#[derive(Debug, Clone)]
pub struct LogEmailSender {
    from_address: String,
}

impl LogEmailSender {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
        }
    }
}

impl Default for LogEmailSender {
    fn default() -> Self {
        Self::new("noreply@alumni-connect.local")
    }
}

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<String> {
        if to.trim().is_empty() {
            return Err(NotificationError::Email("收件人地址为空".to_string()));
        }

        debug!(
            from = %self.from_address,
            to,
            subject,
            content_length = html.len(),
            "Email 发送中..."
        );

        let message_id = format!("email_{}", Uuid::new_v4());
        info!(to, message_id = %message_id, "Email 发送成功");
        Ok(message_id)
    }
}

/// 内置邮件渲染器
///
/// 主题和正文片段都是 `{{variable}}` 模板，正文套进统一的 HTML 外框。
pub struct BuiltinEmailRenderer {
    engine: TemplateEngine,
    templates: HashMap<EmailTemplate, (String, String)>,
    base_url: String,
}

impl BuiltinEmailRenderer {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut renderer = Self {
            engine: TemplateEngine::new(usize::MAX),
            templates: HashMap::new(),
            base_url: base_url.into(),
        };
        renderer.register_defaults();
        renderer
    }

    fn register_defaults(&mut self) {
        self.register(
            EmailTemplate::EventReminder,
            "Reminder: {{event_title}} starts in {{time_until}}",
            "<p>Hi {{user_name}},</p>\
             <p>\"{{event_title}}\" starts on {{event_date}}.</p>\
             <p><a href=\"{{action_link}}\">View event</a></p>",
        );
        self.register(
            EmailTemplate::WeeklyDigest,
            "Your weekly Alumni Connect digest",
            "<p>Hi {{user_name}}, here is what happened this week:</p>\
             <ul>\
             <li>{{new_messages}} new messages</li>\
             <li>{{post_likes}} likes on your posts</li>\
             <li>{{post_comments}} comments on your posts</li>\
             <li>{{events_attending}} event updates</li>\
             <li>{{new_jobs}} new opportunities</li>\
             </ul>",
        );
        self.register(
            EmailTemplate::NewJob,
            "New Job Opportunity: {{job_title}} at {{company}}",
            "<p>Hi {{user_name}},</p>\
             <p>{{company}} posted \"{{job_title}}\".</p>\
             <p><a href=\"{{action_link}}\">View opportunity</a></p>",
        );
        self.register(
            EmailTemplate::Mentorship,
            "{{title}}",
            "<p>Hi {{user_name}},</p><p>{{message}}</p>\
             <p><a href=\"{{action_link}}\">View profile</a></p>",
        );
        self.register(
            EmailTemplate::NewMessage,
            "New message from {{sender_name}}",
            "<p>Hi {{user_name}},</p>\
             <p>{{sender_name}} wrote: \"{{preview}}\"</p>\
             <p><a href=\"{{action_link}}\">Reply</a></p>",
        );
        self.register(
            EmailTemplate::Test,
            "Test Email from Alumni Connect",
            "<p>Hi {{user_name}}, notifications are working.</p>",
        );
    }

    pub fn register(
        &mut self,
        template: EmailTemplate,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) {
        self.templates.insert(template, (subject.into(), body.into()));
    }

    fn wrap(&self, subject: &str, body: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{subject}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        {body}
        <p style="text-align: center; color: #888; font-size: 12px;">
            <a href="{base}/settings/notifications">Manage notification preferences</a>
        </p>
    </div>
</body>
</html>"#,
            base = self.base_url,
        )
    }
}

impl TemplateRenderer for BuiltinEmailRenderer {
    fn render(&self, template: EmailTemplate, context: &NotificationContext) -> Result<RenderedEmail> {
        let (subject, body) = self
            .templates
            .get(&template)
            .ok_or_else(|| NotificationError::Template(format!("未注册的邮件模板: {template:?}")))?;

        // 相对路径拼上站点地址
        let mut context = context.clone();
        if let Some(url) = context.get("action_url").map(str::to_string) {
            context.set("action_link", format!("{}{}", self.base_url, url));
        }

        let subject = self.engine.render(subject, &context);
        let body = self.engine.render(body, &context);
        Ok(RenderedEmail {
            html: self.wrap(&subject, &body),
            subject,
        })
    }
}
