//! 推送调度器
//!
//! 单发、批量和主题推送的统一入口。所有失败都折算为结果对象返回，
//! 调用方可以在推送失败后继续处理站内通知。
//!
//! ## 错误分类
//!
//! - 无 token：不调用网关，直接返回 `no_token`
//! - token 无效或已注销：清除该用户的 token，返回 `invalid_token`
//! - 其他传输错误：返回 `transport_error`，本层不重试

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use alumni_shared::config::PushConfig;
use alumni_shared::observability::metrics;

use super::gateway::{
    GatewayError, PushGateway, PushMessage, PushTarget, TopicManagementResponse, WebPushVariant,
};
use super::token::{TokenDirectory, TokenLookup};
use crate::error::NotificationError;
use crate::models::UserRole;

/// 业务侧的推送内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    pub image_url: Option<String>,
    pub action_url: Option<String>,
}

impl PushPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_action_url(mut self, action_url: impl Into<String>) -> Self {
        self.action_url = Some(action_url.into());
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

/// 推送失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushFailureReason {
    NoToken,
    InvalidToken,
    TransportError,
    RecipientNotFound,
    LookupFailed,
}

impl PushFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoToken => "no_token",
            Self::InvalidToken => "invalid_token",
            Self::TransportError => "transport_error",
            Self::RecipientNotFound => "recipient_not_found",
            Self::LookupFailed => "lookup_failed",
        }
    }
}

/// 单次推送结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub success: bool,
    pub delivery_id: Option<String>,
    pub reason: Option<PushFailureReason>,
    pub detail: Option<String>,
}

impl PushOutcome {
    pub fn delivered(delivery_id: impl Into<String>) -> Self {
        Self {
            success: true,
            delivery_id: Some(delivery_id.into()),
            reason: None,
            detail: None,
        }
    }

    pub fn failed(reason: PushFailureReason, detail: Option<String>) -> Self {
        Self {
            success: false,
            delivery_id: None,
            reason: Some(reason),
            detail,
        }
    }

    fn metric_outcome(&self) -> &'static str {
        self.reason.map_or("delivered", |r| r.as_str())
    }
}

/// 批量推送统计
///
/// `success_count + failure_count == total_targeted`，没有 token 的用户只出现在
/// `without_token` 中。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPushReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub total_targeted: usize,
    pub without_token: Vec<String>,
    pub tokens_invalidated: u64,
    pub error: Option<String>,
}

/// 主题订阅结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicOutcome {
    pub success: bool,
    pub error: Option<String>,
}

/// Web Push 展示参数
#[derive(Debug, Clone)]
pub struct PushOptions {
    pub web_icon: String,
    pub web_badge: String,
    pub vibration_pattern: Vec<u32>,
    pub default_link: String,
}

impl From<&PushConfig> for PushOptions {
    fn from(config: &PushConfig) -> Self {
        Self {
            web_icon: config.web_icon.clone(),
            web_badge: config.web_badge.clone(),
            vibration_pattern: config.vibration_pattern.clone(),
            default_link: config.default_link.clone(),
        }
    }
}

impl Default for PushOptions {
    fn default() -> Self {
        Self::from(&PushConfig::default())
    }
}

/// 推送调度器
pub struct PushDispatcher {
    gateway: Arc<dyn PushGateway>,
    tokens: Arc<TokenDirectory>,
    options: PushOptions,
}

impl PushDispatcher {
    pub fn new(
        gateway: Arc<dyn PushGateway>,
        tokens: Arc<TokenDirectory>,
        options: PushOptions,
    ) -> Self {
        Self {
            gateway,
            tokens,
            options,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenDirectory> {
        &self.tokens
    }

    /// 组装网关消息，actionUrl 同时写入 data 供客户端深链
    pub fn build_message(&self, payload: &PushPayload) -> PushMessage {
        let link = payload
            .action_url
            .clone()
            .unwrap_or_else(|| self.options.default_link.clone());

        let mut data = payload.data.clone();
        data.insert("actionUrl".to_string(), link.clone());
        data.insert("clickAction".to_string(), link.clone());

        PushMessage {
            title: payload.title.clone(),
            body: payload.body.clone(),
            data,
            image_url: payload.image_url.clone(),
            web: WebPushVariant {
                icon: self.options.web_icon.clone(),
                badge: self.options.web_badge.clone(),
                vibration_pattern: self.options.vibration_pattern.clone(),
                require_interaction: false,
                link,
            },
        }
    }

    /// 向单个用户推送，接收人角色由 token 目录查出
    #[instrument(skip(self, payload), fields(title = %payload.title))]
    pub async fn send_push(&self, user_id: &str, payload: &PushPayload) -> PushOutcome {
        let outcome = match self.tokens.lookup(user_id).await {
            Ok(TokenLookup::Found { role, token }) => {
                self.deliver(user_id, role, token, payload).await
            }
            Ok(TokenLookup::Missing { .. }) => no_token(user_id),
            Ok(TokenLookup::UnknownUser) => {
                warn!(user_id, "推送接收人不存在");
                PushOutcome::failed(PushFailureReason::RecipientNotFound, None)
            }
            Err(e) => lookup_failed(user_id, e),
        };
        metrics::record_push_delivery("single", outcome.metric_outcome(), 1);
        outcome
    }

    /// 接收人角色已知时推送，token 按 (用户, 角色) 查找
    #[instrument(skip(self, payload), fields(role = role.as_str(), title = %payload.title))]
    pub async fn send_push_as(
        &self,
        user_id: &str,
        role: UserRole,
        payload: &PushPayload,
    ) -> PushOutcome {
        let outcome = match self.tokens.get_token(user_id, role).await {
            Ok(Some(token)) => self.deliver(user_id, role, token, payload).await,
            Ok(None) => no_token(user_id),
            Err(e) => lookup_failed(user_id, e),
        };
        metrics::record_push_delivery("single", outcome.metric_outcome(), 1);
        outcome
    }

    async fn deliver(
        &self,
        user_id: &str,
        role: UserRole,
        token: String,
        payload: &PushPayload,
    ) -> PushOutcome {
        let message = self.build_message(payload);
        match self.gateway.send(&message, &PushTarget::Token(token)).await {
            Ok(delivery_id) => {
                info!(user_id, delivery_id = %delivery_id, "推送发送成功");
                PushOutcome::delivered(delivery_id)
            }
            Err(e) if e.is_token_invalid() => {
                warn!(user_id, error = %e, "推送 token 已失效，清除 token");
                self.tokens.clear_token(user_id, role).await;
                metrics::record_tokens_invalidated(1);
                PushOutcome::failed(PushFailureReason::InvalidToken, Some(e.to_string()))
            }
            Err(e) => {
                warn!(user_id, error = %e, "推送发送失败");
                PushOutcome::failed(PushFailureReason::TransportError, Some(e.to_string()))
            }
        }
    }

    /// 向多个用户推送同一条消息
    ///
    /// 所有 token 在一次多播调用中发出；失效的 token 统一批量清除。
    #[instrument(skip(self, user_ids, payload), fields(recipients = user_ids.len()))]
    pub async fn send_bulk_push(&self, user_ids: &[String], payload: &PushPayload) -> BulkPushReport {
        let mut seen = HashSet::new();
        let unique: Vec<String> = user_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let entries = match self.tokens.resolve_tokens(&unique).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "批量解析推送 token 失败");
                return BulkPushReport {
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let with_token: HashSet<&str> = entries.iter().map(|e| e.user_id.as_str()).collect();
        let without_token: Vec<String> = unique
            .iter()
            .filter(|id| !with_token.contains(id.as_str()))
            .cloned()
            .collect();

        let mut report = BulkPushReport {
            total_targeted: entries.len(),
            without_token,
            ..Default::default()
        };
        metrics::record_push_delivery("bulk", "no_token", report.without_token.len() as u64);

        if entries.is_empty() {
            info!("没有可推送的 token，跳过批量推送");
            return report;
        }

        let tokens: Vec<String> = entries.into_iter().map(|e| e.token).collect();
        let message = self.build_message(payload);

        match self.gateway.send_multicast(&message, &tokens).await {
            Ok(response) => {
                // 只统计本次请求中的 token，缺失的响应计为失败
                let requested: HashSet<&str> = tokens.iter().map(String::as_str).collect();
                report.success_count = response
                    .responses
                    .iter()
                    .filter(|r| r.result.is_ok() && requested.contains(r.token.as_str()))
                    .count()
                    .min(report.total_targeted);
                report.failure_count = report.total_targeted - report.success_count;

                let invalid: Vec<String> = response
                    .invalid_tokens()
                    .into_iter()
                    .filter(|t| requested.contains(t.as_str()))
                    .collect();
                if !invalid.is_empty() {
                    report.tokens_invalidated = self.tokens.clear_tokens(&invalid).await;
                    metrics::record_tokens_invalidated(report.tokens_invalidated);
                }
            }
            Err(e) => {
                error!(tokens = tokens.len(), error = %e, "批量推送调用失败");
                report.failure_count = report.total_targeted;
                report.error = Some(e.to_string());
            }
        }

        metrics::record_push_delivery("bulk", "delivered", report.success_count as u64);
        metrics::record_push_delivery("bulk", "failed", report.failure_count as u64);
        info!(
            success = report.success_count,
            failure = report.failure_count,
            targeted = report.total_targeted,
            without_token = report.without_token.len(),
            invalidated = report.tokens_invalidated,
            "批量推送完成"
        );
        report
    }

    /// 向主题广播
    #[instrument(skip(self, payload))]
    pub async fn send_topic(&self, topic: &str, payload: &PushPayload) -> PushOutcome {
        let message = self.build_message(payload);
        let outcome = match self
            .gateway
            .send(&message, &PushTarget::Topic(topic.to_string()))
            .await
        {
            Ok(delivery_id) => {
                info!(topic, delivery_id = %delivery_id, "主题推送成功");
                PushOutcome::delivered(delivery_id)
            }
            Err(e) => {
                warn!(topic, error = %e, "主题推送失败");
                PushOutcome::failed(PushFailureReason::TransportError, Some(e.to_string()))
            }
        };
        metrics::record_push_delivery("topic", outcome.metric_outcome(), 1);
        outcome
    }

    pub async fn subscribe(&self, token: &str, topic: &str) -> TopicOutcome {
        let result = self
            .gateway
            .subscribe_to_topic(&[token.to_string()], topic)
            .await;
        topic_outcome("subscribe", topic, result)
    }

    pub async fn unsubscribe(&self, token: &str, topic: &str) -> TopicOutcome {
        let result = self
            .gateway
            .unsubscribe_from_topic(&[token.to_string()], topic)
            .await;
        topic_outcome("unsubscribe", topic, result)
    }
}

fn topic_outcome(
    action: &str,
    topic: &str,
    result: std::result::Result<TopicManagementResponse, GatewayError>,
) -> TopicOutcome {
    match result {
        Ok(response) if response.failure_count == 0 => {
            info!(action, topic, "主题订阅操作成功");
            TopicOutcome {
                success: true,
                error: None,
            }
        }
        Ok(response) => {
            let error = response.errors.join("; ");
            warn!(action, topic, error = %error, "主题订阅操作部分失败");
            TopicOutcome {
                success: false,
                error: Some(error),
            }
        }
        Err(e) => {
            warn!(action, topic, error = %e, "主题订阅操作失败");
            TopicOutcome {
                success: false,
                error: Some(e.to_string()),
            }
        }
    }
}

fn no_token(user_id: &str) -> PushOutcome {
    info!(user_id, "用户未注册推送 token，跳过推送");
    PushOutcome::failed(PushFailureReason::NoToken, None)
}

fn lookup_failed(user_id: &str, e: NotificationError) -> PushOutcome {
    error!(user_id, error = %e, "查询推送 token 失败");
    PushOutcome::failed(PushFailureReason::LookupFailed, Some(e.to_string()))
}
