//! 基础设施层
//!
//! 与业务无关的通用能力：
//!
//! - `tiered_cache` - 内存 + 持久化两级缓存
//! - `durable_tier` - 缓存持久层（目录存储）
//! - `fingerprint` - 缓存键生成
//! - `request_queue` - 带优先级、并发上限与超时的外部请求队列
//! - `task_scheduler` - 有界并发的批量任务调度

pub mod durable_tier;
pub mod fingerprint;
pub mod request_queue;
pub mod task_scheduler;
pub mod tiered_cache;

pub use durable_tier::{DurableTier, FileTier};
pub use fingerprint::cache_key;
pub use request_queue::{
    QueueConfig, QueueStatus, RequestHandle, RequestId, RequestPriority, RequestQueue,
};
pub use task_scheduler::{
    RunStatistics, Task, TaskObserver, TaskOutcome, TaskResult, TaskScheduler,
    DEFAULT_MAX_CONCURRENT,
};
pub use tiered_cache::{CacheConfig, CacheEntry, CacheStats, TieredCache};
