//! 站内通知生命周期集成测试
//!
//! 已读、软删除、保留期清理、后台队列以及公告栏缓存。

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};

use alumni_notification::models::{
    ManualTickerItem, NewNotification, Notification, NotificationFilter, NotificationType,
    OpportunitySummary, UserRecord, UserRole,
};
use alumni_notification::notification::{
    BatchNotificationRequest, NotificationQueue, Recipient, SendCompleteRequest,
};
use alumni_notification::repository::MemoryTickerRepository;
use alumni_notification::ticker::TickerService;
use alumni_notification::worker::RetentionWorker;
use alumni_shared::cache::TtlCache;
use alumni_shared::config::CacheConfig;
use common::Harness;

fn seeded(recipient: &str, age_days: i64, read: bool) -> Notification {
    let created_at = Utc::now() - Duration::days(age_days);
    let mut notification = NewNotification::new(
        recipient,
        UserRole::Alumni,
        NotificationType::Comment,
        "New Comment",
        "Someone commented on your post",
    )
    .into_notification(created_at);
    if read {
        notification.is_read = true;
        notification.read_at = Some(created_at + Duration::hours(1));
    }
    notification
}

#[tokio::test]
async fn test_retention_purges_only_old_read_notifications() {
    let harness = Harness::new();
    let old_read = seeded("u1", 45, true);
    let old_unread = seeded("u1", 90, false);
    let recent_read = seeded("u1", 3, true);
    for n in [&old_read, &old_unread, &recent_read] {
        harness.notifications.seed(n.clone());
    }

    let worker = RetentionWorker::new(harness.store.clone(), StdDuration::from_secs(60));
    assert_eq!(worker.sweep_once().await, 1);

    assert!(harness.notifications.get(old_read.id).is_none());
    assert!(harness.notifications.get(old_unread.id).is_some());
    assert!(harness.notifications.get(recent_read.id).is_some());

    // 再清理一次没有可删除的
    assert_eq!(worker.sweep_once().await, 0);
}

#[tokio::test]
async fn test_read_and_delete_are_scoped_to_recipient() {
    let harness = Harness::new();
    let result = harness
        .service
        .send_complete(
            SendCompleteRequest::new("u1", UserRole::Student, NotificationType::Like, "t", "m")
                .with_channels(false, true),
        )
        .await;
    let id = result.in_app.unwrap().id;

    assert!(harness.store.mark_read(id, "intruder").await.is_err());
    assert!(harness.store.soft_delete(id, "intruder").await.is_err());

    let read = harness.store.mark_read(id, "u1").await.unwrap();
    let first_read_at = read.read_at;
    let again = harness.store.mark_read(id, "u1").await.unwrap();
    assert_eq!(again.read_at, first_read_at);
    assert_eq!(harness.store.unread_count("u1").await.unwrap(), 0);

    harness.store.soft_delete(id, "u1").await.unwrap();
    let page = harness
        .store
        .list("u1", NotificationFilter::default(), None, None)
        .await
        .unwrap();
    assert_eq!(page.total_count, 0);
    // 软删除只是隐藏，记录仍在
    assert!(harness.notifications.get(id).unwrap().is_deleted);
}

#[tokio::test]
async fn test_queue_delivers_in_background() {
    let harness = Harness::new();
    harness
        .users
        .upsert(UserRecord::new("a", UserRole::Alumni).with_push_token("tok-a"));
    harness.users.upsert(UserRecord::new("b", UserRole::Student));

    let (queue, handle) = NotificationQueue::spawn(harness.service.clone(), 16);
    queue
        .enqueue_complete(SendCompleteRequest::new(
            "a",
            UserRole::Alumni,
            NotificationType::Message,
            "New message from Ada",
            "Are you coming to the reunion?",
        ))
        .unwrap();
    queue
        .enqueue_batch(BatchNotificationRequest {
            recipients: vec![
                Recipient::new("a", UserRole::Alumni),
                Recipient::new("b", UserRole::Student),
            ],
            sender_id: None,
            notification_type: NotificationType::System,
            title: "New Announcement".to_string(),
            message: "Library hours extended".to_string(),
            action_url: None,
            related: Default::default(),
            send_push: true,
            send_in_app: true,
        })
        .unwrap();

    drop(queue);
    handle.await.unwrap();

    assert_eq!(harness.notifications.for_recipient("a").len(), 2);
    assert_eq!(harness.notifications.for_recipient("b").len(), 1);
    assert_eq!(harness.gateway.delivered_to("tok-a").len(), 2);
}

#[tokio::test]
async fn test_ticker_cache_expires_after_ttl() {
    let repo = MemoryTickerRepository::new();
    repo.add_manual(ManualTickerItem {
        id: "m1".to_string(),
        title: "Homecoming".to_string(),
        message: "Register now".to_string(),
        item_type: "announcement".to_string(),
        variant: "info".to_string(),
        action_url: None,
        action_label: None,
        icon: None,
        priority: 5,
    });

    let cache = TtlCache::new();
    let config = CacheConfig {
        ticker_ttl_ms: 50,
        ..Default::default()
    };
    let ticker = TickerService::new(Arc::new(repo.clone()), cache.clone(), &config);

    assert_eq!(ticker.get_active_items(Utc::now()).await.unwrap().len(), 1);

    // 缓存期内新增条目不可见
    repo.add_opportunity(OpportunitySummary {
        id: "j1".to_string(),
        title: "Data Analyst".to_string(),
        company: "Acme".to_string(),
        location: None,
        category: None,
        job_type: None,
        is_featured: false,
    });
    assert_eq!(ticker.get_active_items(Utc::now()).await.unwrap().len(), 1);

    tokio::time::sleep(StdDuration::from_millis(120)).await;
    assert_eq!(ticker.get_active_items(Utc::now()).await.unwrap().len(), 2);

    cache.shutdown();
    assert!(cache.is_empty());
}
