//! 分层缓存
//!
//! ## 读写规则
//!
//! - `get`：先查内存层，过期则两层一起删除；内存未命中再查持久层，
//!   命中后提升到内存层（保留原时间戳）
//! - `set`：两层同时写入，然后执行一次清理
//! - 清理：先删过期条目，再按时间戳从旧到新删除，直到数量和总大小都不超限
//!
//! 读命中不会刷新时间戳，淘汰顺序只由写入时间决定。
//!
//! 持久层的任何 I/O 错误都只记录日志，对调用方表现为未命中或空操作。

use crate::infrastructure::durable_tier::DurableTier;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// 缓存配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 最大缓存大小（字节）
    pub max_size: u64,
    /// 最大缓存时间
    pub max_age: Duration,
    /// 最大缓存项数
    pub max_items: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 50 * 1024 * 1024,
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            max_items: 100,
        }
    }
}

/// 缓存项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    /// 写入时间（毫秒时间戳）
    pub timestamp: i64,
    /// 序列化后的字节数
    pub size: u64,
}

/// 缓存统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub count: usize,
    pub size: u64,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
}

struct CacheInner {
    config: CacheConfig,
    memory: Mutex<HashMap<String, CacheEntry>>,
    durable: Arc<dyn DurableTier>,
    last_timestamp: AtomicI64,
}

/// 内存 + 持久化两层缓存
///
/// 克隆开销很小，所有克隆共享同一份状态。
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<CacheInner>,
}

impl TieredCache {
    pub fn new(config: CacheConfig, durable: Arc<dyn DurableTier>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                memory: Mutex::new(HashMap::new()),
                durable,
                last_timestamp: AtomicI64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// 获取缓存
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = now_millis();

        // 先检查内存缓存
        let mem_hit = self.memory().get(key).cloned();
        if let Some(entry) = mem_hit {
            if self.is_fresh(&entry, now) {
                debug!("[TieredCache] 内存缓存命中: {}", key);
                return self.decode(entry).await;
            }
            debug!("[TieredCache] 内存缓存已过期: {}", key);
            self.remove(key).await;
            return None;
        }

        // 检查持久化缓存
        match self.inner.durable.load(key).await {
            Ok(Some(entry)) => {
                if self.is_fresh(&entry, now) {
                    debug!("[TieredCache] 持久化缓存命中: {}", key);
                    self.memory().insert(key.to_string(), entry.clone());
                    self.decode(entry).await
                } else {
                    debug!("[TieredCache] 持久化缓存已过期: {}", key);
                    self.remove(key).await;
                    None
                }
            }
            Ok(None) => {
                debug!("[TieredCache] 缓存未命中: {}", key);
                None
            }
            Err(e) => {
                warn!("[TieredCache] 获取缓存失败: {}", e);
                None
            }
        }
    }

    /// 设置缓存
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("[TieredCache] 序列化失败，跳过缓存 {}: {}", key, e);
                return;
            }
        };
        let size = serde_json::to_vec(&value).map(|b| b.len() as u64).unwrap_or(0);

        let entry = CacheEntry {
            key: key.to_string(),
            value,
            timestamp: self.next_timestamp(),
            size,
        };

        self.memory().insert(key.to_string(), entry.clone());

        if let Err(e) = self.inner.durable.store(&entry).await {
            // 持久层写入失败时不保留内存副本
            self.memory().remove(key);
            warn!("[TieredCache] 设置缓存失败: {}", e);
            return;
        }

        debug!(
            "[TieredCache] 缓存已保存: {}, 大小: {:.2}KB",
            key,
            size as f64 / 1024.0
        );

        self.cleanup().await;
    }

    /// 删除缓存
    pub async fn remove(&self, key: &str) {
        self.memory().remove(key);
        if let Err(e) = self.inner.durable.remove(key).await {
            warn!("[TieredCache] 删除缓存失败: {}", e);
        }
    }

    /// 清空所有缓存
    pub async fn clear(&self) {
        self.memory().clear();
        match self.inner.durable.clear().await {
            Ok(count) => debug!("[TieredCache] 已清空所有缓存: {} 项", count),
            Err(e) => warn!("[TieredCache] 清空缓存失败: {}", e),
        }
    }

    /// 获取缓存统计（以持久层为准）
    pub async fn stats(&self) -> CacheStats {
        match self.inner.durable.entries().await {
            Ok(entries) => CacheStats {
                count: entries.len(),
                size: entries.iter().map(|e| e.size).sum(),
                oldest_timestamp: entries.iter().map(|e| e.timestamp).min(),
                newest_timestamp: entries.iter().map(|e| e.timestamp).max(),
            },
            Err(e) => {
                warn!("[TieredCache] 获取统计失败: {}", e);
                CacheStats::default()
            }
        }
    }

    /// 清理过期和超量缓存
    async fn cleanup(&self) {
        let entries = match self.inner.durable.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("[TieredCache] 清理缓存失败: {}", e);
                return;
            }
        };

        let now = now_millis();
        let mut live = Vec::with_capacity(entries.len());
        let mut total_size: u64 = 0;

        for entry in entries {
            if self.is_fresh(&entry, now) {
                total_size += entry.size;
                live.push(entry);
            } else {
                self.remove(&entry.key).await;
            }
        }

        // 最旧的在前
        live.sort_by_key(|e| e.timestamp);
        let mut live: VecDeque<CacheEntry> = live.into();

        let config = &self.inner.config;
        while live.len() > config.max_items || total_size > config.max_size {
            let Some(oldest) = live.pop_front() else {
                break;
            };
            debug!("[TieredCache] 淘汰最旧缓存: {}", oldest.key);
            self.remove(&oldest.key).await;
            total_size = total_size.saturating_sub(oldest.size);
        }

        debug!(
            "[TieredCache] 清理完成: {} 项, {:.2}MB",
            live.len(),
            total_size as f64 / 1024.0 / 1024.0
        );
    }

    async fn decode<T: DeserializeOwned>(&self, entry: CacheEntry) -> Option<T> {
        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("[TieredCache] 缓存内容无法解析，按未命中处理 {}: {}", entry.key, e);
                self.remove(&entry.key).await;
                None
            }
        }
    }

    fn is_fresh(&self, entry: &CacheEntry, now: i64) -> bool {
        let max_age = i64::try_from(self.inner.config.max_age.as_millis()).unwrap_or(i64::MAX);
        now.saturating_sub(entry.timestamp) < max_age
    }

    /// 同一实例内严格递增的写入时间戳
    fn next_timestamp(&self) -> i64 {
        let now = now_millis();
        let prev = self
            .inner
            .last_timestamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(prev + 1)
    }

    fn memory(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.inner
            .memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn memory_contains(&self, key: &str) -> bool {
        self.memory().contains_key(key)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppResult, PipelineError};
    use crate::infrastructure::durable_tier::FileTier;
    use async_trait::async_trait;
    use serde_json::json;

    fn file_cache(dir: &std::path::Path, config: CacheConfig) -> TieredCache {
        TieredCache::new(config, Arc::new(FileTier::new(dir)))
    }

    /// 所有操作都失败的持久层
    struct BrokenTier;

    #[async_trait]
    impl DurableTier for BrokenTier {
        async fn load(&self, _key: &str) -> AppResult<Option<CacheEntry>> {
            Err(PipelineError::storage("broken", "磁盘不可用"))
        }
        async fn store(&self, _entry: &CacheEntry) -> AppResult<()> {
            Err(PipelineError::storage("broken", "磁盘不可用"))
        }
        async fn remove(&self, _key: &str) -> AppResult<()> {
            Err(PipelineError::storage("broken", "磁盘不可用"))
        }
        async fn entries(&self) -> AppResult<Vec<CacheEntry>> {
            Err(PipelineError::storage("broken", "磁盘不可用"))
        }
        async fn clear(&self) -> AppResult<usize> {
            Err(PipelineError::storage("broken", "磁盘不可用"))
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(dir.path(), CacheConfig::default());

        let value = json!({ "text": "1.A 2.B", "confidence": 0.95 });
        cache.set("ocr_k", &value).await;

        let got: Option<serde_json::Value> = cache.get("ocr_k").await;
        assert_eq!(got, Some(value));
    }

    #[tokio::test]
    async fn test_long_key_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(dir.path(), CacheConfig::default());
        let key = format!("analyze_{}", "x".repeat(200));

        cache.set(&key, &42).await;

        assert_eq!(cache.get::<i32>(&key).await, Some(42));
        assert_eq!(cache.stats().await.count, 1);

        // 重新打开后从持久层读取
        let reopened = file_cache(dir.path(), CacheConfig::default());
        assert_eq!(reopened.get::<i32>(&key).await, Some(42));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_key_writes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(dir.path(), CacheConfig::default());

        let writers: Vec<_> = (0..50)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.set("ocr_shared", &json!({ "writer": i, "text": "1.A 2.B" })).await;
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(cache.stats().await.count, 1);

        let reopened = file_cache(dir.path(), CacheConfig::default());
        let got: serde_json::Value = reopened.get("ocr_shared").await.unwrap();
        let writer = got["writer"].as_i64().unwrap();
        assert!((0..50).contains(&writer));
        assert_eq!(got["text"], "1.A 2.B");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_respect_item_bound() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            max_items: 5,
            ..CacheConfig::default()
        };
        let cache = file_cache(dir.path(), config);

        let writers: Vec<_> = (0..20)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.set(&format!("ocr_{}", i), &i).await;
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(cache.stats().await.count, 5);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(
            dir.path(),
            CacheConfig {
                max_age: Duration::from_millis(50),
                ..CacheConfig::default()
            },
        );

        cache.set("k", &"v").await;
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.get::<String>("k").await.is_none());
        // 过期条目已从两层删除
        assert!(!cache.memory_contains("k"));
        assert_eq!(cache.stats().await.count, 0);
    }

    #[tokio::test]
    async fn test_eviction_drops_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(
            dir.path(),
            CacheConfig {
                max_items: 2,
                ..CacheConfig::default()
            },
        );

        cache.set("A", &1).await;
        cache.set("B", &2).await;
        cache.set("C", &3).await;

        assert_eq!(cache.stats().await.count, 2);
        assert!(cache.get::<i32>("A").await.is_none());
        assert_eq!(cache.get::<i32>("B").await, Some(2));
        assert_eq!(cache.get::<i32>("C").await, Some(3));
    }

    #[tokio::test]
    async fn test_read_does_not_refresh_recency() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(
            dir.path(),
            CacheConfig {
                max_items: 2,
                ..CacheConfig::default()
            },
        );

        cache.set("A", &1).await;
        cache.set("B", &2).await;
        // 读 A 不会让它变“新”
        assert_eq!(cache.get::<i32>("A").await, Some(1));
        cache.set("C", &3).await;

        assert!(cache.get::<i32>("A").await.is_none());
        assert_eq!(cache.get::<i32>("B").await, Some(2));
    }

    #[tokio::test]
    async fn test_size_bound_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(
            dir.path(),
            CacheConfig {
                // 每项约 12 字节（"xxxxxxxxxx" 加引号）
                max_size: 30,
                ..CacheConfig::default()
            },
        );

        cache.set("a", &"xxxxxxxxxx").await;
        cache.set("b", &"xxxxxxxxxx").await;
        cache.set("c", &"xxxxxxxxxx").await;

        let stats = cache.stats().await;
        assert_eq!(stats.count, 2);
        assert!(stats.size <= 30);
        assert!(cache.get::<String>("a").await.is_none());
    }

    #[tokio::test]
    async fn test_durable_hit_is_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let writer = file_cache(dir.path(), CacheConfig::default());
        writer.set("shared", &42).await;

        // 新实例内存为空，只能从持久层读到
        let reader = file_cache(dir.path(), CacheConfig::default());
        assert!(!reader.memory_contains("shared"));
        assert_eq!(reader.get::<i32>("shared").await, Some(42));
        assert!(reader.memory_contains("shared"));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(dir.path(), CacheConfig::default());

        cache.set("x", &1).await;
        cache.set("y", &2).await;
        cache.remove("x").await;
        assert!(cache.get::<i32>("x").await.is_none());
        assert_eq!(cache.stats().await.count, 1);

        cache.clear().await;
        assert!(cache.get::<i32>("y").await.is_none());
        assert_eq!(cache.stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_stats_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(dir.path(), CacheConfig::default());

        cache.set("first", &1).await;
        cache.set("second", &2).await;

        let stats = cache.stats().await;
        assert_eq!(stats.count, 2);
        let oldest = stats.oldest_timestamp.unwrap();
        let newest = stats.newest_timestamp.unwrap();
        assert!(oldest < newest);
    }

    #[tokio::test]
    async fn test_storage_errors_are_swallowed() {
        let cache = TieredCache::new(CacheConfig::default(), Arc::new(BrokenTier));

        cache.set("k", &"v").await;
        assert!(cache.get::<String>("k").await.is_none());
        assert!(!cache.memory_contains("k"));
        cache.remove("k").await;
        cache.clear().await;
        assert_eq!(cache.stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = file_cache(dir.path(), CacheConfig::default());

        cache.set("n", &"not a number").await;
        assert!(cache.get::<u32>("n").await.is_none());
    }
}
