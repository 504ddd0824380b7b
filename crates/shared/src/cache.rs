//! 进程内 TTL 缓存
//!
//! 为读多写少的聚合查询提供 key → value 缓存，每个 key 拥有独立的过期时间。
//!
//! ## 过期策略
//!
//! - **惰性过期**：`get` / `has` 时比较时间戳，过期条目当场移除
//! - **主动过期**：在 tokio 运行时内 `set` 会为条目挂一个定时任务，到期自动移除
//!
//! 覆盖写入、`delete`、`clear` 都会取消旧条目的定时任务；定时任务只持有弱引用，
//! 并通过代数（generation）校验，保证不会误删已被覆盖的新条目。
//!
//! 缓存本身不感知写路径，调用方需要在影响缓存视图的写操作后主动 `delete` / `clear`。

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    next_generation: AtomicU64,
}

impl<V> Inner<V> {
    /// 定时任务触发的移除：只删除仍属于本代的条目
    fn evict_generation(&self, key: &str, generation: u64) {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| e.generation == generation) {
            // 定时任务自身正在运行，直接丢弃句柄即可
            entries.remove(key);
            debug!(key, "cache entry expired");
        }
    }
}

impl<V> Drop for Inner<V> {
    fn drop(&mut self) {
        for entry in self.entries.get_mut().values_mut() {
            entry.cancel_timer();
        }
    }
}

/// 缓存统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
}

/// 通用 TTL 缓存
///
/// 克隆开销很小（内部为 Arc），可以作为依赖注入到多个读接口中。
pub struct TtlCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone + Send + 'static> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// 写入条目，覆盖已有值并重置过期时间
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let timer = self.spawn_eviction(&key, generation, ttl);

        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
            generation,
            timer,
        };

        let mut entries = self.inner.entries.lock();
        if let Some(mut previous) = entries.insert(key, entry) {
            previous.cancel_timer();
        }
    }

    /// 读取条目，过期条目会被移除并返回 None
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.inner.entries.lock();
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                if let Some(mut expired) = entries.remove(key) {
                    expired.cancel_timer();
                }
                None
            }
            None => None,
        }
    }

    /// 检查条目是否存在且未过期，过期条目会被移除
    pub fn has(&self, key: &str) -> bool {
        let mut entries = self.inner.entries.lock();
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => true,
            Some(_) => {
                if let Some(mut expired) = entries.remove(key) {
                    expired.cancel_timer();
                }
                false
            }
            None => false,
        }
    }

    /// 删除条目，返回条目是否存在
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.inner.entries.lock().remove(key);
        match removed {
            Some(mut entry) => {
                entry.cancel_timer();
                true
            }
            None => false,
        }
    }

    /// 清空缓存并取消所有待触发的定时任务
    pub fn clear(&self) {
        let mut entries = self.inner.entries.lock();
        for entry in entries.values_mut() {
            entry.cancel_timer();
        }
        entries.clear();
    }

    /// 当前存储的条目数（含尚未被移除的过期条目）
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.lock().keys().cloned().collect()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.inner.entries.lock();
        let now = Instant::now();
        let expired = entries.values().filter(|e| e.is_expired(now)).count();

        CacheStats {
            total: entries.len(),
            valid: entries.len() - expired,
            expired,
        }
    }

    /// 读穿透：命中直接返回，否则调用 loader 加载并写入缓存
    ///
    /// loader 失败时不写缓存，错误原样返回。
    pub async fn get_or_load<F, Fut, E>(&self, key: &str, ttl: Duration, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(cached) = self.get(key) {
            return Ok(cached);
        }

        let value = loader().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// 关闭缓存：清空条目并取消全部定时任务
    pub fn shutdown(&self) {
        self.clear();
        debug!("ttl cache shut down");
    }

    fn spawn_eviction(&self, key: &str, generation: u64, ttl: Duration) -> Option<JoinHandle<()>> {
        // 不在 tokio 运行时中时只依赖惰性过期
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let inner: Weak<Inner<V>> = Arc::downgrade(&self.inner);
        let key = key.to_string();

        Some(runtime.spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = inner.upgrade() {
                inner.evict_generation(&key, generation);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_before_and_after_ttl() {
        let cache = TtlCache::new();
        cache.set("k", 42, Duration::from_millis(100));
        assert_eq!(cache.get("k"), Some(42));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_lazy_expiry_on_has_removes_entry() {
        // 没有运行时：只有惰性过期生效
        let cache = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::from_millis(100));
        assert!(cache.has("k"));

        std::thread::sleep(Duration::from_millis(130));
        let before = cache.stats();
        assert_eq!(before.total, 1);
        assert_eq!(before.expired, 1);
        assert_eq!(before.valid, 0);

        assert!(!cache.has("k"));
        assert_eq!(cache.stats().total, 0);
    }

    #[tokio::test]
    async fn test_eager_eviction_without_access() {
        let cache = TtlCache::new();
        cache.set("k", 1u32, Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_overwrite_resets_timer() {
        let cache = TtlCache::new();
        cache.set("k", 1, Duration::from_millis(80));
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.set("k", 2, Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(100)).await;
        // 旧定时任务已取消，新值仍然有效
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = TtlCache::new();
        cache.set("a", 1, Duration::from_secs(60));
        cache.set("b", 2, Duration::from_secs(60));

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.keys(), vec!["b".to_string()]);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_clear_cancels_pending_timers() {
        let cache = TtlCache::new();
        cache.set("k", 1, Duration::from_millis(50));
        cache.clear();
        cache.set("k", 2, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test]
    async fn test_get_or_load_caches_success_only() {
        let cache: TtlCache<Vec<u32>> = TtlCache::new();

        let loaded: Result<_, String> = cache
            .get_or_load("feed", Duration::from_secs(60), || async { Ok(vec![1, 2, 3]) })
            .await;
        assert_eq!(loaded.unwrap(), vec![1, 2, 3]);

        // 命中缓存时 loader 不会被调用
        let cached: Result<_, String> = cache
            .get_or_load("feed", Duration::from_secs(60), || async {
                Err("loader must not run".to_string())
            })
            .await;
        assert_eq!(cached.unwrap(), vec![1, 2, 3]);

        let failed: Result<Vec<u32>, String> = cache
            .get_or_load("other", Duration::from_secs(60), || async {
                Err("db down".to_string())
            })
            .await;
        assert!(failed.is_err());
        assert!(!cache.has("other"));
    }
}
