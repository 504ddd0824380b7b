//! 集成测试公共组件
//!
//! 内存仓储 + 可编排结果的推送网关，组装出与生产一致的服务链路。

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use alumni_notification::notification::{
    BuiltinEmailRenderer, LogEmailSender, NotificationSender, NotificationService,
    NotificationStore, SenderOptions, TemplateEngine,
};
use alumni_notification::push::{
    GatewayError, MulticastResponse, PushDispatcher, PushGateway, PushMessage, PushOptions,
    PushTarget, TokenDirectory, TokenSendResult, TopicManagementResponse,
};
use alumni_notification::repository::{
    MemoryEventRepository, MemoryNotificationRepository, MemoryUserRepository,
};
use alumni_notification::worker::ReminderScheduler;
use alumni_shared::config::NotificationConfig;

/// 按 token 预设失败结果的推送网关，记录每一次投递
#[derive(Default)]
pub struct ScriptedGateway {
    failures: Mutex<HashMap<String, GatewayError>>,
    multicast_error: Mutex<Option<GatewayError>>,
    sent: Mutex<Vec<(PushTarget, PushMessage)>>,
    multicast_calls: Mutex<Vec<Vec<String>>>,
    subscriptions: Mutex<Vec<(String, String)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_token(&self, token: &str, error: GatewayError) {
        self.failures
            .lock()
            .unwrap()
            .insert(token.to_string(), error);
    }

    pub fn fail_multicast(&self, error: GatewayError) {
        *self.multicast_error.lock().unwrap() = Some(error);
    }

    /// 成功投递到单个 token 的消息
    pub fn delivered_to(&self, token: &str) -> Vec<PushMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| *target == PushTarget::Token(token.to_string()))
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn multicast_calls(&self) -> Vec<Vec<String>> {
        self.multicast_calls.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<(String, String)> {
        self.subscriptions.lock().unwrap().clone()
    }

    fn outcome(&self, token: &str) -> Result<String, GatewayError> {
        match self.failures.lock().unwrap().get(token) {
            Some(error) => Err(error.clone()),
            None => Ok(format!("msg-{token}")),
        }
    }
}

#[async_trait]
impl PushGateway for ScriptedGateway {
    async fn send(
        &self,
        message: &PushMessage,
        target: &PushTarget,
    ) -> Result<String, GatewayError> {
        let result = match target {
            PushTarget::Token(token) => self.outcome(token),
            PushTarget::Topic(topic) => Ok(format!("topic-{topic}")),
        };
        if result.is_ok() {
            self.sent
                .lock()
                .unwrap()
                .push((target.clone(), message.clone()));
        }
        result
    }

    async fn send_multicast(
        &self,
        message: &PushMessage,
        tokens: &[String],
    ) -> Result<MulticastResponse, GatewayError> {
        self.multicast_calls.lock().unwrap().push(tokens.to_vec());
        if let Some(error) = self.multicast_error.lock().unwrap().clone() {
            return Err(error);
        }

        let responses = tokens
            .iter()
            .map(|token| {
                let result = self.outcome(token);
                if result.is_ok() {
                    self.sent
                        .lock()
                        .unwrap()
                        .push((PushTarget::Token(token.clone()), message.clone()));
                }
                TokenSendResult {
                    token: token.clone(),
                    result,
                }
            })
            .collect();
        Ok(MulticastResponse { responses })
    }

    async fn subscribe_to_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> Result<TopicManagementResponse, GatewayError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        for token in tokens {
            subscriptions.push((token.clone(), topic.to_string()));
        }
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
        self.subscriptions
            .lock()
            .unwrap()
            .retain(|(token, t)| !(tokens.contains(token) && t == topic));
        Ok(TopicManagementResponse {
            success_count: tokens.len(),
            ..Default::default()
        })
    }
}

/// 完整的服务链路
pub struct Harness {
    pub users: MemoryUserRepository,
    pub notifications: MemoryNotificationRepository,
    pub events: MemoryEventRepository,
    pub gateway: Arc<ScriptedGateway>,
    pub store: Arc<NotificationStore>,
    pub service: Arc<NotificationService>,
    pub sender: Arc<NotificationSender>,
    pub scheduler: Arc<ReminderScheduler>,
}

impl Harness {
    pub fn new() -> Self {
        let users = MemoryUserRepository::new();
        let notifications = MemoryNotificationRepository::new();
        let events = MemoryEventRepository::new();
        let gateway = Arc::new(ScriptedGateway::new());

        let push = Arc::new(PushDispatcher::new(
            gateway.clone(),
            Arc::new(TokenDirectory::new(Arc::new(users.clone()))),
            PushOptions::default(),
        ));
        let store = Arc::new(NotificationStore::new(
            Arc::new(notifications.clone()),
            &NotificationConfig::default(),
        ));
        let service = Arc::new(NotificationService::new(
            store.clone(),
            push,
            Arc::new(TemplateEngine::default()),
        ));
        let sender = Arc::new(NotificationSender::new(
            service.clone(),
            Arc::new(users.clone()),
            Arc::new(LogEmailSender::default()),
            Arc::new(BuiltinEmailRenderer::new("https://alumni.example")),
            SenderOptions {
                digest_pacing: std::time::Duration::ZERO,
                ..Default::default()
            },
        ));
        let scheduler = Arc::new(ReminderScheduler::new(
            Arc::new(events.clone()),
            sender.clone(),
        ));

        Self {
            users,
            notifications,
            events,
            gateway,
            store,
            service,
            sender,
            scheduler,
        }
    }
}
