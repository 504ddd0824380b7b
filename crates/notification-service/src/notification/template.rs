//! 通知模板引擎
//!
//! 提供模板变量替换功能，支持 `{{variable}}` 语法，并内置一份
//! "业务事件 -> 标题 / 正文 / 通知类型" 的模板目录。
//!
//! ## 使用示例
//!
//! ```ignore
//! let engine = TemplateEngine::with_defaults(50);
//!
//! let mut context = NotificationContext::new();
//! context.set("sender_name", "Jane Doe");
//! context.set("preview", "Great talk today!");
//!
//! let rendered = engine.render_kind(TemplateKind::PostComment, &context)?;
//! // rendered.message == "Jane Doe commented on your post: \"Great talk today!\""
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::NotificationContext;
use crate::error::{NotificationError, Result};
use crate::models::NotificationType;

/// 匹配 {{variable_name}} 格式，变量名支持字母、数字、下划线
static VARIABLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("模板变量正则必须合法"));

/// 渲染前会被截断的变量
const PREVIEW_VARIABLE: &str = "preview";

const ELLIPSIS: &str = "...";

/// 模板目录中的业务事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateKind {
    ConnectionRequest,
    ConnectionAccepted,
    PostLike,
    PostComment,
    PostMention,
    NewMessage,
    EventInvitation,
    EventReminder,
    EventUpdate,
    NewJobPosted,
    InternshipPosted,
    MentorshipRequest,
    MentorshipAccepted,
    ProfileVerified,
    MilestoneReached,
    Welcome,
    Announcement,
}

/// 已注册的模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTemplate {
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
}

/// 渲染结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
}

/// 模板引擎
///
/// 管理通知模板并提供变量替换功能
pub struct TemplateEngine {
    templates: HashMap<TemplateKind, NotificationTemplate>,
    /// `preview` 变量的最大字符数（含省略号）
    preview_max_chars: usize,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::with_defaults(50)
    }
}

impl TemplateEngine {
    /// 创建空的模板引擎
    pub fn new(preview_max_chars: usize) -> Self {
        Self {
            templates: HashMap::new(),
            preview_max_chars,
        }
    }

    /// 创建带有默认模板的引擎
    pub fn with_defaults(preview_max_chars: usize) -> Self {
        let mut engine = Self::new(preview_max_chars);
        engine.register_default_templates();
        engine
    }

    fn register_default_templates(&mut self) {
        use NotificationType as T;
        use TemplateKind as K;

        // 社交关系
        self.register_template(
            K::ConnectionRequest,
            T::Connection,
            "New Connection Request",
            "{{sender_name}} sent you a connection request",
        );
        self.register_template(
            K::ConnectionAccepted,
            T::Connection,
            "Connection Accepted",
            "{{sender_name}} accepted your connection request",
        );

        // 动态互动
        self.register_template(
            K::PostLike,
            T::Like,
            "New Like",
            "{{sender_name}} liked your post: \"{{preview}}\"",
        );
        self.register_template(
            K::PostComment,
            T::Comment,
            "New Comment",
            "{{sender_name}} commented on your post: \"{{preview}}\"",
        );
        self.register_template(
            K::PostMention,
            T::Mention,
            "You were mentioned",
            "{{sender_name}} mentioned you in a post: \"{{preview}}\"",
        );
        self.register_template(
            K::NewMessage,
            T::Message,
            "New Message",
            "{{sender_name}}: {{preview}}",
        );

        // 活动
        self.register_template(
            K::EventInvitation,
            T::Event,
            "New Event Invitation",
            "You're invited to \"{{event_title}}\" on {{event_date}}",
        );
        self.register_template(
            K::EventReminder,
            T::Event,
            "Event Reminder",
            "\"{{event_title}}\" starts in {{time_until}}",
        );
        self.register_template(
            K::EventUpdate,
            T::Event,
            "Event Updated",
            "Details for \"{{event_title}}\" have been updated",
        );

        // 机会
        self.register_template(
            K::NewJobPosted,
            T::Opportunity,
            "New Job Opportunity",
            "{{job_title}} at {{company}}",
        );
        self.register_template(
            K::InternshipPosted,
            T::Opportunity,
            "New Internship",
            "{{job_title}} at {{company}}",
        );

        // 导师
        self.register_template(
            K::MentorshipRequest,
            T::System,
            "Mentorship Request",
            "{{sender_name}} requested you to be their mentor",
        );
        self.register_template(
            K::MentorshipAccepted,
            T::System,
            "Mentorship Accepted",
            "{{sender_name}} accepted your mentorship request",
        );

        // 系统
        self.register_template(
            K::ProfileVerified,
            T::Achievement,
            "Profile Verified",
            "Your profile has been verified successfully",
        );
        self.register_template(
            K::MilestoneReached,
            T::Achievement,
            "Milestone Achieved!",
            "Congratulations! You've reached {{milestone}}",
        );
        self.register_template(
            K::Welcome,
            T::System,
            "Welcome to Alumni Connect!",
            "Hi {{user_name}}, start connecting with alumni and students",
        );
        self.register_template(
            K::Announcement,
            T::System,
            "New Announcement",
            "{{title}}",
        );
    }

    /// 注册模板，同一事件重复注册时覆盖
    pub fn register_template(
        &mut self,
        kind: TemplateKind,
        notification_type: NotificationType,
        title_template: impl Into<String>,
        body_template: impl Into<String>,
    ) {
        self.templates.insert(
            kind,
            NotificationTemplate {
                notification_type,
                title: title_template.into(),
                body: body_template.into(),
            },
        );
    }

    pub fn get_template(&self, kind: TemplateKind) -> Option<&NotificationTemplate> {
        self.templates.get(&kind)
    }

    /// 渲染模板
    ///
    /// 将模板中的 `{{variable}}` 替换为上下文中的对应值。
    /// 未找到的变量会保留原样并记录警告日志。
    pub fn render(&self, template: &str, context: &NotificationContext) -> String {
        let result = VARIABLE_REGEX.replace_all(template, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match context.get(var_name) {
                Some(value) if var_name == PREVIEW_VARIABLE => {
                    truncate_preview(value, self.preview_max_chars)
                }
                Some(value) => value.to_string(),
                None => {
                    warn!(variable = var_name, "模板变量未找到，保留原样");
                    caps[0].to_string()
                }
            }
        });

        result.into_owned()
    }

    /// 按目录渲染标题、正文和通知类型
    pub fn render_kind(
        &self,
        kind: TemplateKind,
        context: &NotificationContext,
    ) -> Result<RenderedTemplate> {
        let template = self
            .get_template(kind)
            .ok_or_else(|| NotificationError::Template(format!("未注册的模板: {kind:?}")))?;

        Ok(RenderedTemplate {
            notification_type: template.notification_type,
            title: self.render(&template.title, context),
            message: self.render(&template.body, context),
        })
    }
}

/// 截断预览文本，超长时保留前 `max_chars - 3` 个字符并追加省略号
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_engine_with_defaults() {
        let engine = TemplateEngine::with_defaults(50);

        assert!(engine.get_template(TemplateKind::ConnectionRequest).is_some());
        assert!(engine.get_template(TemplateKind::EventReminder).is_some());
        assert!(engine.get_template(TemplateKind::Announcement).is_some());
        assert!(TemplateEngine::new(50)
            .get_template(TemplateKind::Welcome)
            .is_none());
    }

    #[test]
    fn test_render_simple() {
        let engine = TemplateEngine::new(50);
        let mut context = NotificationContext::new();
        context.set("user_name", "Ada");

        assert_eq!(engine.render("Hi {{user_name}}!", &context), "Hi Ada!");
    }

    #[test]
    fn test_render_missing_variable() {
        let engine = TemplateEngine::new(50);
        let context = NotificationContext::new();

        // 未找到的变量保留原样
        assert_eq!(engine.render("Hi {{user_name}}!", &context), "Hi {{user_name}}!");
    }

    #[test]
    fn test_render_kind_event_reminder() {
        let engine = TemplateEngine::with_defaults(50);
        let mut context = NotificationContext::new();
        context.set("event_title", "Homecoming");
        context.set("time_until", "1 hour");

        let rendered = engine
            .render_kind(TemplateKind::EventReminder, &context)
            .unwrap();
        assert_eq!(rendered.title, "Event Reminder");
        assert_eq!(rendered.message, "\"Homecoming\" starts in 1 hour");
        assert_eq!(rendered.notification_type, NotificationType::Event);
    }

    #[test]
    fn test_render_kind_truncates_preview() {
        let engine = TemplateEngine::with_defaults(10);
        let mut context = NotificationContext::new();
        context.set("sender_name", "Bob");
        context.set("preview", "this message is far too long");

        let rendered = engine
            .render_kind(TemplateKind::NewMessage, &context)
            .unwrap();
        assert_eq!(rendered.message, "Bob: this me...");
        assert_eq!(rendered.notification_type, NotificationType::Message);
    }

    #[test]
    fn test_render_kind_unregistered() {
        let engine = TemplateEngine::new(50);
        let err = engine
            .render_kind(TemplateKind::Welcome, &NotificationContext::new())
            .unwrap_err();
        assert!(matches!(err, NotificationError::Template(_)));
    }

    #[test]
    fn test_truncate_preview() {
        assert_eq!(truncate_preview("short", 50), "short");
        let exact = "a".repeat(50);
        assert_eq!(truncate_preview(&exact, 50), exact);

        let long = "b".repeat(60);
        let truncated = truncate_preview(&long, 50);
        assert_eq!(truncated.chars().count(), 50);
        assert!(truncated.ends_with("..."));

        // 按字符而不是字节截断
        assert_eq!(truncate_preview("你好世界你好世界", 5), "你好...");
    }
}
