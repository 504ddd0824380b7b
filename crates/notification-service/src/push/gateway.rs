//! 推送网关抽象
//!
//! 定义发往外部推送服务的消息结构和网关 trait。网关只负责"发出去"，
//! token 清理等后续处理由调度器根据返回的错误分类完成。

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Web 推送的平台特定参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebPushVariant {
    pub icon: String,
    pub badge: String,
    pub vibration_pattern: Vec<u32>,
    pub require_interaction: bool,
    /// 点击通知后打开的链接
    pub link: String,
}

/// 发往网关的完整消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// 透传给客户端的数据，值只能是字符串
    pub data: BTreeMap<String, String>,
    pub image_url: Option<String>,
    pub web: WebPushVariant,
}

/// 投递目标
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PushTarget {
    Token(String),
    Topic(String),
}

/// 网关错误
///
/// token 无效与 token 未注册都意味着这个 token 不会再成功，需要清理。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("无效的推送 token: {0}")]
    InvalidToken(String),

    #[error("推送 token 已注销: {0}")]
    Unregistered(String),

    #[error("推送网关传输失败: {0}")]
    Transport(String),
}

impl GatewayError {
    /// token 是否已经不可用
    pub fn is_token_invalid(&self) -> bool {
        matches!(self, Self::InvalidToken(_) | Self::Unregistered(_))
    }
}

/// 多播中单个 token 的结果
///
/// 结果显式携带 token，而不是依赖与请求列表的位置对应关系。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSendResult {
    pub token: String,
    pub result: Result<String, GatewayError>,
}

/// 多播响应
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MulticastResponse {
    pub responses: Vec<TokenSendResult>,
}

impl MulticastResponse {
    pub fn success_count(&self) -> usize {
        self.responses.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.responses.len() - self.success_count()
    }

    /// 需要清理的失效 token
    pub fn invalid_tokens(&self) -> Vec<String> {
        self.responses
            .iter()
            .filter(|r| matches!(&r.result, Err(e) if e.is_token_invalid()))
            .map(|r| r.token.clone())
            .collect()
    }
}

/// 主题订阅管理的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicManagementResponse {
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<String>,
}

/// 推送网关 trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// 发送到单个 token 或主题，成功时返回网关分配的投递 ID
    async fn send(&self, message: &PushMessage, target: &PushTarget)
    -> Result<String, GatewayError>;

    /// 一次调用发送到多个 token
    ///
    /// 单个 token 的失败体现在响应中；只有整个调用无法完成时才返回 Err。
    async fn send_multicast(
        &self,
        message: &PushMessage,
        tokens: &[String],
    ) -> Result<MulticastResponse, GatewayError>;

    async fn subscribe_to_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResponse, GatewayError>;

    async fn unsubscribe_from_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResponse, GatewayError>;
}
