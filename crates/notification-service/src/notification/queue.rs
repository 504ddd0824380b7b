//! 后台通知队列
//!
//! 业务侧不等待通知结果时，把请求放入有界队列，由单个后台任务依次发送。
//! 队列满时立即返回 `QueueFull`，不会阻塞调用方；发送失败只记日志。
//!
//! 生产者是 Web 层的请求处理函数（发帖、点赞等），不在本 crate 内。
//! 进程入口只负责队列的生命周期：启动时创建，关闭时丢弃自己的发送端并等待剩余任务发完。
//! Web 层嵌入时克隆发送端使用，后台任务要等所有克隆都被丢弃后才退出。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use alumni_shared::observability::metrics;

use super::service::NotificationService;
use super::types::{BatchNotificationRequest, SendCompleteRequest};
use crate::error::{NotificationError, Result};

/// 队列中的任务
#[derive(Debug, Clone)]
pub enum NotificationJob {
    Complete(Box<SendCompleteRequest>),
    Batch(Box<BatchNotificationRequest>),
}

impl NotificationJob {
    fn kind(&self) -> &'static str {
        match self {
            Self::Complete(_) => "complete",
            Self::Batch(_) => "batch",
        }
    }
}

/// 队列发送端，可以克隆后分发给各业务模块
///
/// 所有发送端被丢弃后，后台任务处理完剩余任务即退出。
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<NotificationJob>,
}

impl NotificationQueue {
    /// 创建队列并启动后台消费任务
    pub fn spawn(service: Arc<NotificationService>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(service, rx));
        info!(capacity, "后台通知队列已启动");
        (Self { tx }, handle)
    }

    pub fn enqueue(&self, job: NotificationJob) -> Result<()> {
        let kind = job.kind();
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                metrics::record_queue_dropped();
                warn!(kind, "后台通知队列已满，丢弃任务");
                NotificationError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => {
                error!(kind, "后台通知队列已关闭");
                NotificationError::QueueClosed
            }
        })
    }

    pub fn enqueue_complete(&self, request: SendCompleteRequest) -> Result<()> {
        self.enqueue(NotificationJob::Complete(Box::new(request)))
    }

    pub fn enqueue_batch(&self, request: BatchNotificationRequest) -> Result<()> {
        self.enqueue(NotificationJob::Batch(Box::new(request)))
    }
}

async fn run_worker(service: Arc<NotificationService>, mut rx: mpsc::Receiver<NotificationJob>) {
    while let Some(job) = rx.recv().await {
        match job {
            NotificationJob::Complete(request) => {
                let recipient_id = request.recipient_id.clone();
                let result = service.send_complete(*request).await;

                if let Some(e) = &result.in_app_error {
                    error!(recipient_id = %recipient_id, error = %e, "后台站内通知写入失败");
                }
                match &result.push {
                    Some(push) if !push.success => warn!(
                        recipient_id = %recipient_id,
                        reason = ?push.reason,
                        "后台推送未送达"
                    ),
                    _ => debug!(recipient_id = %recipient_id, "后台通知处理完成"),
                }
            }
            NotificationJob::Batch(request) => {
                let result = service.send_batch(*request).await;
                if result.in_app_failed > 0 {
                    error!(failed = result.in_app_failed, "后台批量站内通知部分写入失败");
                }
                if let Some(error) = result.push.as_ref().and_then(|p| p.error.as_ref()) {
                    error!(error = %error, "后台批量推送调用失败");
                }
            }
        }
    }
    info!("后台通知队列已关闭，消费任务退出");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationType, UserRole};
    use crate::notification::store::NotificationStore;
    use crate::notification::template::TemplateEngine;
    use crate::push::gateway::MockPushGateway;
    use crate::push::{PushDispatcher, PushOptions, TokenDirectory};
    use crate::repository::{MemoryNotificationRepository, MemoryUserRepository};
    use alumni_shared::config::NotificationConfig;

    fn service(repo: &MemoryNotificationRepository) -> Arc<NotificationService> {
        let users = MemoryUserRepository::new();
        let push = Arc::new(PushDispatcher::new(
            Arc::new(MockPushGateway::new()),
            Arc::new(TokenDirectory::new(Arc::new(users))),
            PushOptions::default(),
        ));
        let store = Arc::new(NotificationStore::new(
            Arc::new(repo.clone()),
            &NotificationConfig::default(),
        ));
        Arc::new(NotificationService::new(
            store,
            push,
            Arc::new(TemplateEngine::default()),
        ))
    }

    fn request(recipient: &str) -> SendCompleteRequest {
        SendCompleteRequest::new(recipient, UserRole::Alumni, NotificationType::Post, "t", "m")
            .with_channels(false, true)
    }

    #[tokio::test]
    async fn test_worker_drains_queue_on_shutdown() {
        let repo = MemoryNotificationRepository::new();
        let (queue, handle) = NotificationQueue::spawn(service(&repo), 8);

        queue.enqueue_complete(request("u1")).unwrap();
        queue.enqueue_complete(request("u2")).unwrap();
        drop(queue);

        handle.await.unwrap();
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn test_worker_runs_until_every_clone_is_dropped() {
        let repo = MemoryNotificationRepository::new();
        let (queue, handle) = NotificationQueue::spawn(service(&repo), 8);
        let producer = queue.clone();

        drop(queue);
        producer.enqueue_complete(request("u1")).unwrap();
        assert!(!handle.is_finished());

        drop(producer);
        handle.await.unwrap();
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let queue = NotificationQueue { tx };

        queue.enqueue_complete(request("u1")).unwrap();
        let err = queue.enqueue_complete(request("u2")).unwrap_err();
        assert!(matches!(err, NotificationError::QueueFull));
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let queue = NotificationQueue { tx };

        let err = queue.enqueue_complete(request("u1")).unwrap_err();
        assert!(matches!(err, NotificationError::QueueClosed));
    }
}
