//! 滚动公告服务
//!
//! 合并运营条目、即将开始的活动和最新机会，结果放在带 TTL 的进程内缓存里。
//! 运营条目有写入时调用 [`TickerService::invalidate`] 让下一次读取重新加载。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use alumni_shared::cache::TtlCache;
use alumni_shared::config::CacheConfig;
use alumni_shared::observability::metrics;

use crate::error::Result;
use crate::models::{TickerItem, TickerSource};
use crate::repository::TickerRepositoryTrait;

pub const ACTIVE_ITEMS_KEY: &str = "active-ticker-items";

const MANUAL_LIMIT: usize = 10;
const EVENT_LIMIT: u32 = 5;
const OPPORTUNITY_LIMIT: u32 = 5;

pub struct TickerService {
    repo: Arc<dyn TickerRepositoryTrait>,
    cache: TtlCache<Vec<TickerItem>>,
    ttl: Duration,
    max_items: usize,
}

impl TickerService {
    pub fn new(
        repo: Arc<dyn TickerRepositoryTrait>,
        cache: TtlCache<Vec<TickerItem>>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            repo,
            cache,
            ttl: config.ticker_ttl(),
            max_items: config.ticker_max_items,
        }
    }

    /// 当前生效的公告条目，缓存命中时不访问数据库
    #[instrument(skip(self))]
    pub async fn get_active_items(&self, now: DateTime<Utc>) -> Result<Vec<TickerItem>> {
        let hit = self.cache.has(ACTIVE_ITEMS_KEY);
        metrics::record_cache_lookup("ticker", hit);

        self.cache
            .get_or_load(ACTIVE_ITEMS_KEY, self.ttl, || self.load(now))
            .await
    }

    /// 丢弃缓存的公告列表
    pub fn invalidate(&self) {
        if self.cache.delete(ACTIVE_ITEMS_KEY) {
            debug!("公告缓存已失效");
        }
    }

    async fn load(&self, now: DateTime<Utc>) -> Result<Vec<TickerItem>> {
        let mut manual = self.repo.list_manual_items(now).await?;
        manual.truncate(MANUAL_LIMIT);
        let events = self.repo.list_upcoming_events(now, EVENT_LIMIT).await?;
        let jobs = self.repo.list_recent_opportunities(OPPORTUNITY_LIMIT).await?;

        let items = merge_items(
            manual
                .into_iter()
                .map(TickerItem::from)
                .chain(events.into_iter().map(TickerItem::from))
                .chain(jobs.into_iter().map(TickerItem::from))
                .collect(),
            self.max_items,
        );

        info!(count = items.len(), "公告条目已重新加载");
        Ok(items)
    }
}

/// 按优先级降序排列，同优先级时运营条目在前，其余保持原有顺序
pub fn merge_items(mut items: Vec<TickerItem>, max_items: usize) -> Vec<TickerItem> {
    items.sort_by(|a, b| {
        b.priority.cmp(&a.priority).then_with(|| {
            let a_manual = a.source == TickerSource::Manual;
            let b_manual = b.source == TickerSource::Manual;
            b_manual.cmp(&a_manual)
        })
    });
    items.truncate(max_items);
    items
}
