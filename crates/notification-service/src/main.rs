//! 通知服务
//!
//! 进程入口：装配仓储、推送网关和通知服务，启动定时提醒、清理任务和后台队列，
//! 收到关闭信号后依次停止。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use alumni_shared::{cache::TtlCache, config::AppConfig, database::Database, observability};

use alumni_notification::{
    notification::{
        BuiltinEmailRenderer, LogEmailSender, NotificationQueue, NotificationSender,
        NotificationService, NotificationStore, SenderOptions, TemplateEngine,
    },
    push::{FcmGateway, LoggingPushGateway, PushDispatcher, PushGateway, PushOptions, TokenDirectory},
    repository::{EventRepository, NotificationRepository, TickerRepository, UserRepository},
    ticker::TickerService,
    worker::{ReminderScheduler, RetentionWorker, ScanTimer},
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置：config/default.toml、config/{env}.toml、config/notification-service.toml、环境变量
    let config = AppConfig::load("notification-service").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });

    // 2. 日志与指标
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!("Starting notification-service...");
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 数据库
    let db = Database::connect(&config.database).await?;
    db.run_migrations(&sqlx::migrate!()).await?;
    let pool = db.pool().clone();
    info!("Database connection established");

    // 4. 仓储
    let user_repo = Arc::new(UserRepository::new(pool.clone()));
    let notification_repo = Arc::new(NotificationRepository::new(pool.clone()));
    let event_repo = Arc::new(EventRepository::new(pool.clone()));
    let ticker_repo = Arc::new(TickerRepository::new(pool.clone()));
    info!("Repositories initialized");

    // 5. 推送网关：未启用或缺少凭证时只记日志
    let gateway: Arc<dyn PushGateway> =
        if config.push.enabled && config.push.access_token.is_some() {
            info!(project_id = %config.push.project_id, "FCM push gateway enabled");
            Arc::new(FcmGateway::new(config.push.clone())?)
        } else {
            warn!("Push credentials not configured, push notifications will only be logged");
            Arc::new(LoggingPushGateway)
        };
    let push = Arc::new(PushDispatcher::new(
        gateway,
        Arc::new(TokenDirectory::new(user_repo.clone())),
        PushOptions::from(&config.push),
    ));

    // 6. 通知服务
    let store = Arc::new(NotificationStore::new(
        notification_repo,
        &config.notifications,
    ));
    let templates = Arc::new(TemplateEngine::with_defaults(
        config.notifications.preview_max_chars,
    ));
    let service = Arc::new(NotificationService::new(store.clone(), push, templates));

    let sender = Arc::new(NotificationSender::new(
        service.clone(),
        user_repo,
        Arc::new(LogEmailSender::new(&config.email.from_address)),
        Arc::new(BuiltinEmailRenderer::new(&config.email.site_url)),
        SenderOptions::from_config(&config)?,
    ));

    // 后台队列的发送端由 Web 层的请求处理函数持有，这里只管理启动和关闭时的排空
    let (queue, queue_handle) =
        NotificationQueue::spawn(service.clone(), config.notifications.queue_capacity);
    info!("Notification services initialized");

    // 7. 公告栏缓存预热
    let ticker_cache = TtlCache::new();
    let ticker = TickerService::new(ticker_repo, ticker_cache.clone(), &config.cache);
    match ticker.get_active_items(Utc::now()).await {
        Ok(items) => info!(count = items.len(), "Ticker cache warmed up"),
        Err(e) => warn!(error = %e, "Ticker cache warmup failed"),
    }

    // 8. 后台任务
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();

    let scheduler = Arc::new(ReminderScheduler::new(event_repo, sender));
    if config.scheduler.enabled {
        let timer = ScanTimer::from_config(&config.scheduler, scheduler)?;
        workers.extend(timer.spawn(shutdown_rx.clone()));
        info!(
            utc_offset = %config.scheduler.utc_offset,
            "Reminder scheduler started"
        );
    } else {
        warn!("Reminder scheduler disabled by configuration");
    }

    let retention = RetentionWorker::new(
        store,
        Duration::from_secs(config.notifications.sweep_interval_seconds),
    );
    workers.push(tokio::spawn(retention.run(shutdown_rx)));

    info!("notification-service is running");
    shutdown_signal().await;

    // 9. 依次停止：定时任务、后台队列、缓存、连接池
    let _ = shutdown_tx.send(true);
    for handle in workers {
        if let Err(e) = handle.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    drop(queue);
    if let Err(e) = queue_handle.await {
        warn!(error = %e, "Notification queue ended abnormally");
    }

    ticker_cache.shutdown();
    db.close().await;

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
