//! 请求队列管理器
//!
//! ## 功能
//!
//! - 限制同时进行中的外部请求数量
//! - 等待中的请求按（优先级降序，入队顺序升序）排列
//! - 每个请求从**开始执行**时计时，超时后调用方收到超时错误
//! - 支持取消尚未开始的请求
//!
//! ## 超时语义
//!
//! 请求在独立的 tokio 任务中执行。超时只让调用方停止等待，
//! 底层操作默认继续在后台运行，结果被丢弃。
//! 设置 `abort_on_timeout` 后超时会直接中止该任务。

use crate::error::{AppResult, PipelineError};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// 请求优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RequestPriority {
    Low = 0,
    Normal = 1,
    High = 2,
    Urgent = 3,
}

impl Default for RequestPriority {
    fn default() -> Self {
        RequestPriority::Normal
    }
}

/// 请求队列配置
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// 最大并发数
    pub max_concurrent: usize,
    /// 单个请求的超时时间（从开始执行时计时）
    pub timeout: Duration,
    /// 超时后是否中止底层操作
    pub abort_on_timeout: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            timeout: Duration::from_secs(30),
            abort_on_timeout: false,
        }
    }
}

/// 请求 ID，按入队顺序单调递增
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req_{}", self.0)
    }
}

/// 队列状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub pending: usize,
    pub running: usize,
    pub max_concurrent: usize,
}

/// 等待列表的排序键：优先级高的在前，同优先级按序号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingKey {
    priority: Reverse<RequestPriority>,
    sequence: u64,
}

/// 类型擦除后的排队请求
trait QueuedJob: Send {
    fn start(self: Box<Self>, timeout: Duration, abort_on_timeout: bool) -> BoxFuture<'static, ()>;
    fn cancel(self: Box<Self>);
}

struct Job<T> {
    id: RequestId,
    operation: BoxFuture<'static, AppResult<T>>,
    reply: oneshot::Sender<AppResult<T>>,
}

impl<T: Send + 'static> QueuedJob for Job<T> {
    fn start(self: Box<Self>, timeout: Duration, abort_on_timeout: bool) -> BoxFuture<'static, ()> {
        let Job {
            id,
            operation,
            reply,
        } = *self;

        Box::pin(async move {
            let mut handle = tokio::spawn(operation);

            let result = match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(PipelineError::TaskPanicked {
                    task: id.to_string(),
                    message: join_err.to_string(),
                }),
                Err(_) => {
                    if abort_on_timeout {
                        handle.abort();
                    }
                    warn!(
                        "[RequestQueue] 请求超时: {} ({}ms)",
                        id,
                        timeout.as_millis()
                    );
                    Err(PipelineError::timeout(id.to_string(), timeout))
                }
            };

            match &result {
                Ok(_) => debug!("[RequestQueue] 请求成功: {}", id),
                Err(e) => debug!("[RequestQueue] 请求失败: {}: {}", id, e),
            }

            // 调用方可能已经不再等待
            let _ = reply.send(result);
        })
    }

    fn cancel(self: Box<Self>) {
        let _ = self
            .reply
            .send(Err(PipelineError::cancelled(self.id.to_string())));
    }
}

struct PendingRequest {
    id: RequestId,
    job: Box<dyn QueuedJob>,
}

#[derive(Default)]
struct QueueState {
    pending: BTreeMap<PendingKey, PendingRequest>,
    running: usize,
}

struct QueueInner {
    config: QueueConfig,
    state: Mutex<QueueState>,
    sequence: AtomicU64,
}

/// 请求队列
///
/// 显式创建并注入使用方，克隆后共享同一个队列。
/// 入队会在当前 tokio 运行时上启动任务。
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl RequestQueue {
    pub fn new(mut config: QueueConfig) -> Self {
        config.max_concurrent = config.max_concurrent.max(1);
        Self {
            inner: Arc::new(QueueInner {
                config,
                state: Mutex::new(QueueState::default()),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// 添加请求到队列，返回可等待的句柄（可用于取消）
    pub fn submit<T, F>(&self, operation: F, priority: RequestPriority) -> RequestHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = AppResult<T>> + Send + 'static,
    {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let id = RequestId(sequence);
        let (reply, rx) = oneshot::channel();

        let job = Box::new(Job {
            id,
            operation: Box::pin(operation),
            reply,
        });

        let queue_len = {
            let mut state = self.state();
            state.pending.insert(
                PendingKey {
                    priority: Reverse(priority),
                    sequence,
                },
                PendingRequest { id, job },
            );
            state.pending.len()
        };

        debug!(
            "[RequestQueue] 请求已加入队列: {}, 优先级: {:?}, 队列长度: {}",
            id, priority, queue_len
        );

        self.process_queue();

        RequestHandle { id, rx }
    }

    /// 添加请求并等待结果
    pub async fn enqueue<T, F>(&self, operation: F, priority: RequestPriority) -> AppResult<T>
    where
        T: Send + 'static,
        F: Future<Output = AppResult<T>> + Send + 'static,
    {
        self.submit(operation, priority).await
    }

    /// 取消尚未开始的请求
    ///
    /// 已经开始执行的请求不受影响，返回 `false`。
    pub fn cancel(&self, id: RequestId) -> bool {
        let removed = {
            let mut state = self.state();
            let key = state
                .pending
                .iter()
                .find(|(_, request)| request.id == id)
                .map(|(key, _)| *key);
            key.and_then(|key| state.pending.remove(&key))
        };

        match removed {
            Some(request) => {
                request.job.cancel();
                info!("[RequestQueue] 请求已取消: {}", id);
                true
            }
            None => false,
        }
    }

    /// 取消所有等待中的请求，返回取消数量
    pub fn cancel_all(&self) -> usize {
        let drained = std::mem::take(&mut self.state().pending);
        let count = drained.len();

        for (_, request) in drained {
            request.job.cancel();
        }

        info!("[RequestQueue] 已取消所有请求: {} 个", count);
        count
    }

    /// 获取队列状态
    pub fn status(&self) -> QueueStatus {
        let state = self.state();
        QueueStatus {
            pending: state.pending.len(),
            running: state.running,
            max_concurrent: self.inner.config.max_concurrent,
        }
    }

    /// 有空闲槽位时不断取出队首请求并启动
    fn process_queue(&self) {
        loop {
            let request = {
                let mut state = self.state();
                if state.running >= self.inner.config.max_concurrent {
                    return;
                }
                let Some((_, request)) = state.pending.pop_first() else {
                    return;
                };
                state.running += 1;
                debug!(
                    "[RequestQueue] 开始执行请求: {}, 运行中: {}/{}",
                    request.id, state.running, self.inner.config.max_concurrent
                );
                request
            };

            let queue = self.clone();
            let timeout = self.inner.config.timeout;
            let abort_on_timeout = self.inner.config.abort_on_timeout;

            tokio::spawn(async move {
                request.job.start(timeout, abort_on_timeout).await;
                queue.finish();
            });
        }
    }

    /// 请求结束（成功、失败或超时）后释放槽位
    fn finish(&self) {
        {
            let mut state = self.state();
            state.running = state.running.saturating_sub(1);
        }
        self.process_queue();
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// 排队请求的句柄
///
/// 等待句柄得到请求结果；句柄被丢弃不会取消请求。
pub struct RequestHandle<T> {
    id: RequestId,
    rx: oneshot::Receiver<AppResult<T>>,
}

impl<T> RequestHandle<T> {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl<T> Future for RequestHandle<T> {
    type Output = AppResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(PipelineError::cancelled(id.to_string()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::time::{sleep, Instant};

    fn queue(max_concurrent: usize, timeout_ms: u64) -> RequestQueue {
        RequestQueue::new(QueueConfig {
            max_concurrent,
            timeout: Duration::from_millis(timeout_ms),
            abort_on_timeout: false,
        })
    }

    /// 占住一个槽位，直到发送端被触发
    fn blocker(queue: &RequestQueue) -> (oneshot::Sender<()>, RequestHandle<()>) {
        let (release, wait) = oneshot::channel::<()>();
        let handle = queue.submit(
            async move {
                let _ = wait.await;
                Ok(())
            },
            RequestPriority::Urgent,
        );
        (release, handle)
    }

    fn recording(
        queue: &RequestQueue,
        order: &Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
        priority: RequestPriority,
    ) -> RequestHandle<&'static str> {
        let order = order.clone();
        queue.submit(
            async move {
                order.lock().unwrap().push(label);
                Ok(label)
            },
            priority,
        )
    }

    #[tokio::test]
    async fn test_priority_admission_order() {
        let queue = queue(1, 30_000);
        let order = Arc::new(Mutex::new(Vec::new()));

        let (release, gate) = blocker(&queue);
        let low = recording(&queue, &order, "LOW", RequestPriority::Low);
        let high = recording(&queue, &order, "HIGH", RequestPriority::High);
        let normal = recording(&queue, &order, "NORMAL", RequestPriority::Normal);

        assert_eq!(queue.status().pending, 3);
        release.send(()).unwrap();

        gate.await.unwrap();
        assert_eq!(low.await.unwrap(), "LOW");
        assert_eq!(high.await.unwrap(), "HIGH");
        assert_eq!(normal.await.unwrap(), "NORMAL");

        assert_eq!(*order.lock().unwrap(), vec!["HIGH", "NORMAL", "LOW"]);
    }

    #[tokio::test]
    async fn test_equal_priority_keeps_enqueue_order() {
        let queue = queue(1, 30_000);
        let order = Arc::new(Mutex::new(Vec::new()));

        let (release, gate) = blocker(&queue);
        let labels = ["a", "b", "c", "d", "e"];
        let handles: Vec<_> = labels
            .iter()
            .map(|l| recording(&queue, &order, l, RequestPriority::Normal))
            .collect();

        release.send(()).unwrap();
        gate.await.unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), labels.to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_never_exceeds_ceiling() {
        let queue = queue(2, 30_000);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let current = current.clone();
                let peak = peak.clone();
                queue.submit(
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    },
                    RequestPriority::Normal,
                )
            })
            .collect();

        assert!(queue.status().running <= 2);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        let status = queue.status();
        assert_eq!((status.pending, status.running), (0, 0));
    }

    #[tokio::test]
    async fn test_cancel_pending_request() {
        let queue = queue(1, 30_000);
        let (release, gate) = blocker(&queue);

        let pending = queue.submit(async { Ok(1) }, RequestPriority::Normal);
        let id = pending.id();

        assert!(queue.cancel(id));
        assert_eq!(queue.status().pending, 0);

        let err = pending.await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        // 第二次取消：已不在队列中
        assert!(!queue.cancel(id));

        release.send(()).unwrap();
        gate.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_running_request_is_noop() {
        let queue = queue(1, 30_000);
        let (release, gate) = blocker(&queue);
        let running_id = gate.id();

        assert_eq!(queue.status().running, 1);
        assert!(!queue.cancel(running_id));

        release.send(()).unwrap();
        tokio_test::assert_ok!(gate.await);
    }

    #[tokio::test]
    async fn test_cancel_all_pending() {
        let queue = queue(1, 30_000);
        let (release, gate) = blocker(&queue);

        let handles: Vec<_> = (0..3)
            .map(|i| queue.submit(async move { Ok(i) }, RequestPriority::Low))
            .collect();

        assert_eq!(queue.cancel_all(), 3);
        for handle in handles {
            assert!(handle.await.unwrap_err().is_cancelled());
        }

        release.send(()).unwrap();
        gate.await.unwrap();
        assert_eq!(queue.status().running, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_operation_running() {
        let queue = queue(1, 50);
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let started = Instant::now();
        let result = queue
            .enqueue(
                async move {
                    sleep(Duration::from_millis(200)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                },
                RequestPriority::Normal,
            )
            .await;

        let elapsed = started.elapsed();
        assert!(result.unwrap_err().is_timeout());
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(100));

        // 槽位已释放，但后台操作仍会完成
        sleep(Duration::from_millis(5)).await;
        assert_eq!(queue.status().running, 0);
        assert!(!finished.load(Ordering::SeqCst));

        sleep(Duration::from_millis(250)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_on_timeout_stops_operation() {
        let queue = RequestQueue::new(QueueConfig {
            max_concurrent: 1,
            timeout: Duration::from_millis(50),
            abort_on_timeout: true,
        });
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let result = queue
            .enqueue(
                async move {
                    sleep(Duration::from_millis(200)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                },
                RequestPriority::Normal,
            )
            .await;
        assert!(result.unwrap_err().is_timeout());

        sleep(Duration::from_millis(300)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_starts_when_request_starts() {
        // 第二个请求排队 80ms，自身耗时 60ms：从入队算会超时，从开始算不会
        let queue = queue(1, 100);

        let first = queue.submit(
            async {
                sleep(Duration::from_millis(80)).await;
                Ok("first")
            },
            RequestPriority::Normal,
        );
        let second = queue.submit(
            async {
                sleep(Duration::from_millis(60)).await;
                Ok("second")
            },
            RequestPriority::Normal,
        );

        assert_eq!(first.await.unwrap(), "first");
        assert_eq!(second.await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_failure_does_not_block_queue() {
        let queue = queue(1, 30_000);

        let failing = queue.submit(
            async { Err::<(), _>(PipelineError::external("ocr", "503")) },
            RequestPriority::High,
        );
        let ok = queue.submit(async { Ok(7) }, RequestPriority::Normal);

        let err = failing.await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalService);
        assert_eq!(ok.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_status_reports_ceiling() {
        let queue = queue(0, 1_000);
        // 并发数 0 按 1 处理
        assert_eq!(
            queue.status(),
            QueueStatus {
                pending: 0,
                running: 0,
                max_concurrent: 1
            }
        );
    }
}
