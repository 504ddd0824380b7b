//! 已读通知清理 Worker
//!
//! 按固定间隔物理删除超过保留期的已读通知，未读通知永久保留。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};

use alumni_shared::observability::metrics;

use crate::notification::NotificationStore;

/// 清理 Worker
pub struct RetentionWorker {
    store: Arc<NotificationStore>,
    sweep_interval: Duration,
}

impl RetentionWorker {
    pub fn new(store: Arc<NotificationStore>, sweep_interval: Duration) -> Self {
        Self {
            store,
            sweep_interval: sweep_interval.max(Duration::from_secs(1)),
        }
    }

    /// 执行一次清理，返回删除条数
    pub async fn sweep_once(&self) -> u64 {
        let purged = match self.store.purge_expired(Utc::now()).await {
            Ok(purged) => purged,
            Err(e) => {
                error!(error = %e, "已读通知清理失败");
                0
            }
        };
        metrics::set_worker_last_run("retention_worker");
        purged
    }

    /// 主循环：启动后立即清理一次，之后按间隔执行，直到收到 shutdown 信号
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sweep_interval = ?self.sweep_interval,
            retention_days = self.store.retention().num_days(),
            "RetentionWorker 已启动"
        );
        let mut ticker = tokio::time::interval(self.sweep_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("RetentionWorker 已停止");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    use crate::models::{NewNotification, NotificationType, UserRole};
    use crate::repository::MemoryNotificationRepository;
    use alumni_shared::config::NotificationConfig;

    fn aged(recipient: &str, days: i64, read: bool) -> crate::models::Notification {
        let mut notification = NewNotification::new(
            recipient,
            UserRole::Alumni,
            NotificationType::Like,
            "New Like",
            "liked your post",
        )
        .into_notification(Utc::now() - ChronoDuration::days(days));
        notification.is_read = read;
        notification
    }

    #[tokio::test]
    async fn test_sweep_removes_only_old_read_items() {
        let repo = MemoryNotificationRepository::new();
        let old_read = aged("u1", 31, true);
        let old_unread = aged("u1", 90, false);
        let fresh_read = aged("u1", 2, true);
        repo.seed(old_read.clone());
        repo.seed(old_unread.clone());
        repo.seed(fresh_read.clone());

        let store = Arc::new(NotificationStore::new(
            Arc::new(repo.clone()),
            &NotificationConfig::default(),
        ));
        let worker = RetentionWorker::new(store, Duration::from_secs(60));

        assert_eq!(worker.sweep_once().await, 1);
        assert!(repo.get(old_read.id).is_none());
        assert!(repo.get(old_unread.id).is_some());
        assert!(repo.get(fresh_read.id).is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(NotificationStore::new(
            Arc::new(MemoryNotificationRepository::new()),
            &NotificationConfig::default(),
        ));
        let worker = RetentionWorker::new(store, Duration::from_secs(3600));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(rx));
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
