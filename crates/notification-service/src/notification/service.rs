//! 通知编排服务
//!
//! 把站内通知存储和推送调度组合成"完整通知"一次发送。
//!
//! ## 设计说明
//!
//! - **站内优先**：先写站内通知，推送的 data 中带上站内通知 id，客户端可据此跳转
//! - **渠道独立**：站内写入失败不阻止推送，推送失败也不回滚站内通知
//! - **部分成功**：结果分别记录两个渠道，调用方按需处理

use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, instrument, warn};

use super::store::NotificationStore;
use super::template::{TemplateEngine, TemplateKind};
use super::types::{
    BatchNotificationRequest, BatchNotificationResult, CompleteNotificationResult,
    NotificationContext, SendCompleteRequest,
};
use crate::error::Result;
use crate::models::{NewNotification, UserRole};
use crate::push::{PushDispatcher, PushPayload};

/// 通知编排服务
pub struct NotificationService {
    store: Arc<NotificationStore>,
    push: Arc<PushDispatcher>,
    templates: Arc<TemplateEngine>,
}

impl NotificationService {
    pub fn new(
        store: Arc<NotificationStore>,
        push: Arc<PushDispatcher>,
        templates: Arc<TemplateEngine>,
    ) -> Self {
        Self {
            store,
            push,
            templates,
        }
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn push(&self) -> &Arc<PushDispatcher> {
        &self.push
    }

    pub fn templates(&self) -> &Arc<TemplateEngine> {
        &self.templates
    }

    /// 按模板目录构造完整通知请求
    pub fn templated_request(
        &self,
        kind: TemplateKind,
        context: &NotificationContext,
        recipient_id: &str,
        recipient_role: UserRole,
    ) -> Result<SendCompleteRequest> {
        let rendered = self.templates.render_kind(kind, context)?;
        Ok(SendCompleteRequest::new(
            recipient_id,
            recipient_role,
            rendered.notification_type,
            rendered.title,
            rendered.message,
        ))
    }

    /// 发送完整通知
    ///
    /// 两个渠道各自成败，本方法不返回错误。
    #[instrument(
        skip(self, request),
        fields(
            recipient_id = %request.recipient_id,
            notification_type = request.notification_type.as_str(),
            send_push = request.send_push,
            send_in_app = request.send_in_app
        )
    )]
    pub async fn send_complete(&self, request: SendCompleteRequest) -> CompleteNotificationResult {
        let mut result = CompleteNotificationResult::default();

        if request.send_in_app {
            match self.store.create(request.to_new_notification()).await {
                Ok(notification) => result.in_app = Some(notification),
                Err(e) => {
                    error!(error = %e, "站内通知写入失败，继续推送");
                    result.in_app_error = Some(e.to_string());
                }
            }
        }

        if request.send_push {
            let mut payload = PushPayload::new(&request.title, &request.message)
                .with_data("type", request.notification_type.as_str());
            if let Some(notification) = &result.in_app {
                payload = payload.with_data("notificationId", notification.id.to_string());
            }
            if let Some(url) = &request.action_url {
                payload = payload.with_action_url(url);
            }
            if let Some(image) = &request.image_url {
                payload = payload.with_image_url(image);
            }

            let outcome = self
                .push
                .send_push_as(&request.recipient_id, request.recipient_role, &payload)
                .await;
            if !outcome.success {
                warn!(
                    reason = ?outcome.reason,
                    detail = outcome.detail.as_deref().unwrap_or(""),
                    "推送未送达"
                );
            }
            result.push = Some(outcome);
        }

        info!(
            in_app = result.in_app.is_some(),
            push = result.push.as_ref().is_some_and(|p| p.success),
            "完整通知处理完成"
        );
        result
    }

    /// 同一内容发给多个接收人
    ///
    /// 站内通知逐个并发写入，推送走一次批量调用。
    #[instrument(skip(self, request), fields(recipients = request.recipients.len()))]
    pub async fn send_batch(&self, request: BatchNotificationRequest) -> BatchNotificationResult {
        let mut result = BatchNotificationResult::default();

        if request.send_in_app {
            let writes = request.recipients.iter().map(|recipient| {
                let mut new = NewNotification::new(
                    &recipient.id,
                    recipient.role,
                    request.notification_type,
                    &request.title,
                    &request.message,
                )
                .with_related(request.related.clone());
                new.sender_id = request.sender_id.clone();
                new.action_url = request.action_url.clone();
                self.store.create(new)
            });

            for outcome in join_all(writes).await {
                match outcome {
                    Ok(_) => result.in_app_created += 1,
                    Err(e) => {
                        warn!(error = %e, "批量站内通知写入失败");
                        result.in_app_failed += 1;
                    }
                }
            }
        }

        if request.send_push {
            let user_ids: Vec<String> = request.recipients.iter().map(|r| r.id.clone()).collect();
            let mut payload = PushPayload::new(&request.title, &request.message)
                .with_data("type", request.notification_type.as_str());
            if let Some(url) = &request.action_url {
                payload = payload.with_action_url(url);
            }
            result.push = Some(self.push.send_bulk_push(&user_ids, &payload).await);
        }

        info!(
            in_app_created = result.in_app_created,
            in_app_failed = result.in_app_failed,
            "批量通知处理完成"
        );
        result
    }
}
