//! FCM 推送网关
//!
//! 基于 FCM HTTP v1 接口（`messages:send`）发送推送，主题订阅走 IID 批量接口。
//!
//! HTTP v1 没有多播端点，多播按批次并发调用单发接口，每个结果都带着对应的 token，
//! 因此统计和清理不依赖响应顺序。

use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use alumni_shared::config::PushConfig;

use super::gateway::{
    GatewayError, MulticastResponse, PushGateway, PushMessage, PushTarget, TokenSendResult,
    TopicManagementResponse,
};

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopicBatchResponse {
    #[serde(default)]
    results: Vec<TopicBatchResult>,
}

#[derive(Debug, Deserialize)]
struct TopicBatchResult {
    error: Option<String>,
}

/// FCM 推送网关
pub struct FcmGateway {
    client: reqwest::Client,
    config: PushConfig,
}

impl FcmGateway {
    pub fn new(config: PushConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project_id
        )
    }

    fn access_token(&self) -> Result<&str, GatewayError> {
        self.config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::Transport("未配置推送网关访问凭证".to_string()))
    }

    async fn post_message(&self, body: Value) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(self.access_token()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &text));
        }

        let parsed: SendResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(parsed.name)
    }

    async fn manage_topic(
        &self,
        action: &str,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResponse, GatewayError> {
        let url = format!(
            "{}/iid/v1:{}",
            self.config.iid_endpoint.trim_end_matches('/'),
            action
        );
        let body = json!({
            "to": format!("/topics/{topic}"),
            "registration_tokens": tokens,
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(self.access_token()?)
            .header("access_token_auth", "true")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::Transport(format!("HTTP {status}: {text}")));
        }

        let parsed: TopicBatchResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(summarize_topic_results(tokens, parsed.results))
    }
}

/// 构造 FCM v1 的 message 对象
pub fn build_fcm_message(message: &PushMessage, target: &PushTarget) -> Value {
    let mut notification = json!({
        "title": message.title,
        "body": message.body,
    });
    if let Some(image) = &message.image_url {
        notification["image"] = json!(image);
    }

    let mut body = json!({
        "notification": notification,
        "data": message.data,
        "webpush": {
            "notification": {
                "title": message.title,
                "body": message.body,
                "icon": message.web.icon,
                "badge": message.web.badge,
                "vibrate": message.web.vibration_pattern,
                "requireInteraction": message.web.require_interaction,
            },
            "fcm_options": {
                "link": message.web.link,
            },
        },
    });

    match target {
        PushTarget::Token(token) => body["token"] = json!(token),
        PushTarget::Topic(topic) => body["topic"] = json!(topic),
    }

    json!({ "message": body })
}

/// 把 FCM 错误响应映射为网关错误
fn classify_error(status: u16, body: &str) -> GatewayError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return GatewayError::Transport(format!("HTTP {status}: {body}"));
    };
    let error = envelope.error;

    let code = error
        .details
        .iter()
        .find_map(|d| d.error_code.as_deref())
        .or(error.status.as_deref())
        .unwrap_or_default();

    match code {
        "UNREGISTERED" => GatewayError::Unregistered(error.message),
        "INVALID_ARGUMENT" if error.message.to_lowercase().contains("registration token") => {
            GatewayError::InvalidToken(error.message)
        }
        "SENDER_ID_MISMATCH" => GatewayError::InvalidToken(error.message),
        _ => GatewayError::Transport(format!("HTTP {status} {code}: {}", error.message)),
    }
}

fn summarize_topic_results(
    tokens: &[String],
    results: Vec<TopicBatchResult>,
) -> TopicManagementResponse {
    let mut summary = TopicManagementResponse::default();
    for (token, result) in tokens.iter().zip(results) {
        match result.error {
            Some(error) => {
                summary.failure_count += 1;
                summary.errors.push(format!("{token}: {error}"));
            }
            None => summary.success_count += 1,
        }
    }
    summary
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send(
        &self,
        message: &PushMessage,
        target: &PushTarget,
    ) -> Result<String, GatewayError> {
        self.post_message(build_fcm_message(message, target)).await
    }

    async fn send_multicast(
        &self,
        message: &PushMessage,
        tokens: &[String],
    ) -> Result<MulticastResponse, GatewayError> {
        // 凭证缺失时整个调用失败，而不是每个 token 各报一次
        self.access_token()?;

        let start = Instant::now();
        let batch_size = self.config.multicast_batch_size.max(1);
        let mut responses = Vec::with_capacity(tokens.len());

        for chunk in tokens.chunks(batch_size) {
            let sends = chunk.iter().map(|token| async move {
                let target = PushTarget::Token(token.clone());
                TokenSendResult {
                    token: token.clone(),
                    result: self.post_message(build_fcm_message(message, &target)).await,
                }
            });
            responses.extend(join_all(sends).await);
        }

        let response = MulticastResponse { responses };
        debug!(
            tokens = tokens.len(),
            success = response.success_count(),
            failure = response.failure_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "FCM 多播完成"
        );
        Ok(response)
    }

    async fn subscribe_to_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResponse, GatewayError> {
        self.manage_topic("batchAdd", tokens, topic).await
    }

    async fn unsubscribe_from_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResponse, GatewayError> {
        self.manage_topic("batchRemove", tokens, topic).await
    }
}

/// 只记录日志的推送网关
///
/// 推送未启用或未配置凭证时使用，所有发送都直接返回成功。
#[derive(Debug, Default)]
pub struct LoggingPushGateway;

#[async_trait]
impl PushGateway for LoggingPushGateway {
    async fn send(
        &self,
        message: &PushMessage,
        target: &PushTarget,
    ) -> Result<String, GatewayError> {
        let message_id = format!("log_{}", Uuid::new_v4());
        info!(
            target = ?target,
            title = %message.title,
            message_id = %message_id,
            "推送未启用，仅记录日志"
        );
        Ok(message_id)
    }

    async fn send_multicast(
        &self,
        message: &PushMessage,
        tokens: &[String],
    ) -> Result<MulticastResponse, GatewayError> {
        info!(
            tokens = tokens.len(),
            title = %message.title,
            "推送未启用，多播仅记录日志"
        );
        Ok(MulticastResponse {
            responses: tokens
                .iter()
                .map(|token| TokenSendResult {
                    token: token.clone(),
                    result: Ok(format!("log_{}", Uuid::new_v4())),
                })
                .collect(),
        })
    }

    async fn subscribe_to_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResponse, GatewayError> {
        warn!(topic, tokens = tokens.len(), "推送未启用，忽略主题订阅");
        Ok(TopicManagementResponse {
            success_count: tokens.len(),
            ..Default::default()
        })
    }

    async fn unsubscribe_from_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResponse, GatewayError> {
        warn!(topic, tokens = tokens.len(), "推送未启用，忽略取消订阅");
        Ok(TopicManagementResponse {
            success_count: tokens.len(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::gateway::WebPushVariant;
    use std::collections::BTreeMap;

    fn message() -> PushMessage {
        let mut data = BTreeMap::new();
        data.insert("actionUrl".to_string(), "/events/e1".to_string());
        PushMessage {
            title: "Event Reminder".to_string(),
            body: "\"Meetup\" starts in 1 hour".to_string(),
            data,
            image_url: None,
            web: WebPushVariant {
                icon: "/logo.png".to_string(),
                badge: "/badge.png".to_string(),
                vibration_pattern: vec![200, 100, 200],
                require_interaction: false,
                link: "/events/e1".to_string(),
            },
        }
    }

    #[test]
    fn test_build_message_for_token() {
        let body = build_fcm_message(&message(), &PushTarget::Token("tok".to_string()));
        let msg = &body["message"];

        assert_eq!(msg["token"], "tok");
        assert!(msg.get("topic").is_none());
        assert_eq!(msg["notification"]["title"], "Event Reminder");
        assert_eq!(msg["data"]["actionUrl"], "/events/e1");
        assert_eq!(msg["webpush"]["notification"]["vibrate"], json!([200, 100, 200]));
        assert_eq!(msg["webpush"]["notification"]["requireInteraction"], false);
        assert_eq!(msg["webpush"]["fcm_options"]["link"], "/events/e1");
    }

    #[test]
    fn test_build_message_for_topic_with_image() {
        let mut m = message();
        m.image_url = Some("https://cdn/img.png".to_string());
        let body = build_fcm_message(&m, &PushTarget::Topic("announcements".to_string()));

        assert_eq!(body["message"]["topic"], "announcements");
        assert_eq!(body["message"]["notification"]["image"], "https://cdn/img.png");
    }

    #[test]
    fn test_classify_unregistered() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND","details":[{"@type":"type.googleapis.com/google.firebase.fcm.v1.FcmError","errorCode":"UNREGISTERED"}]}}"#;
        assert!(matches!(classify_error(404, body), GatewayError::Unregistered(_)));
    }

    #[test]
    fn test_classify_invalid_token() {
        let body = r#"{"error":{"code":400,"message":"The registration token is not a valid FCM registration token","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(classify_error(400, body), GatewayError::InvalidToken(_)));
    }

    #[test]
    fn test_classify_other_errors_as_transport() {
        let quota = r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(classify_error(429, quota), GatewayError::Transport(_)));
        assert!(matches!(classify_error(502, "<html>bad gateway</html>"), GatewayError::Transport(_)));
    }

    #[test]
    fn test_summarize_topic_results() {
        let tokens = vec!["a".to_string(), "b".to_string()];
        let results = vec![
            TopicBatchResult { error: None },
            TopicBatchResult {
                error: Some("NOT_FOUND".to_string()),
            },
        ];
        let summary = summarize_topic_results(&tokens, results);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.errors, vec!["b: NOT_FOUND"]);
    }

    #[tokio::test]
    async fn test_multicast_without_credentials_fails_whole_call() {
        let gateway = FcmGateway::new(PushConfig::default()).unwrap();
        let result = gateway
            .send_multicast(&message(), &["t1".to_string()])
            .await;
        assert!(matches!(result, Err(GatewayError::Transport(_))));
    }

    #[tokio::test]
    async fn test_logging_gateway_succeeds_for_every_token() {
        let gateway = LoggingPushGateway;
        let tokens = vec!["t1".to_string(), "t2".to_string()];
        let response = gateway.send_multicast(&message(), &tokens).await.unwrap();
        assert_eq!(response.success_count(), 2);
        assert!(response.invalid_tokens().is_empty());
    }
}
