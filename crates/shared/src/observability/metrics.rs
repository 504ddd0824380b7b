//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册通知子系统的指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("push_deliveries_total", "Push deliveries by outcome");
    metrics::describe_counter!(
        "push_tokens_invalidated_total",
        "Push tokens cleared after the gateway rejected them"
    );
    metrics::describe_counter!("in_app_notifications_total", "In-app notifications created");
    metrics::describe_counter!("reminders_sent_total", "Event reminder batches dispatched");
    metrics::describe_histogram!(
        "reminder_scan_duration_seconds",
        "Reminder scan duration in seconds"
    );
    metrics::describe_counter!(
        "notification_queue_dropped_total",
        "Background notifications dropped because the queue was full"
    );
    metrics::describe_counter!("cache_hits_total", "Read-through cache hits");
    metrics::describe_counter!("cache_misses_total", "Read-through cache misses");
    metrics::describe_gauge!(
        "worker_last_run_timestamp",
        "Unix timestamp of the last completed worker iteration"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录推送投递结果
///
/// `outcome` 取值：delivered / no_token / invalid_token / transport_error
#[inline]
pub fn record_push_delivery(mode: &str, outcome: &str, count: u64) {
    metrics::counter!(
        "push_deliveries_total",
        "mode" => mode.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(count);
}

/// 记录被清理的失效 token
#[inline]
pub fn record_tokens_invalidated(count: u64) {
    metrics::counter!("push_tokens_invalidated_total").increment(count);
}

/// 记录站内通知创建
#[inline]
pub fn record_in_app_created(notification_type: &str) {
    metrics::counter!(
        "in_app_notifications_total",
        "type" => notification_type.to_string()
    )
    .increment(1);
}

/// 记录提醒扫描
#[inline]
pub fn record_reminder_scan(scan: &str, reminders_sent: u64, duration_secs: f64) {
    metrics::counter!("reminders_sent_total", "scan" => scan.to_string())
        .increment(reminders_sent);
    metrics::histogram!("reminder_scan_duration_seconds", "scan" => scan.to_string())
        .record(duration_secs);
}

/// 记录后台队列丢弃
#[inline]
pub fn record_queue_dropped() {
    metrics::counter!("notification_queue_dropped_total").increment(1);
}

/// 记录读缓存命中情况
#[inline]
pub fn record_cache_lookup(cache: &str, hit: bool) {
    if hit {
        metrics::counter!("cache_hits_total", "cache" => cache.to_string()).increment(1);
    } else {
        metrics::counter!("cache_misses_total", "cache" => cache.to_string()).increment(1);
    }
}

/// 记录 Worker 最近一次运行时间，供告警判断 Worker 是否存活
#[inline]
pub fn set_worker_last_run(worker: &str) {
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string())
        .set(chrono::Utc::now().timestamp() as f64);
}
