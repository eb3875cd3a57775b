//! 并发任务调度器
//!
//! 一次性运行一组异步任务：
//!
//! - 按优先级降序排序（稳定排序，同优先级保持提交顺序）
//! - 最多 `max_concurrent` 个任务同时运行，有任务结束就立即补位
//! - 单个任务的失败或 panic 只记录在它自己的结果里
//! - 每完成一个任务回调一次进度

use crate::error::{AppResult, PipelineError};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::cmp::Reverse;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 默认并发上限
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// 待执行的任务
pub struct Task<T> {
    pub id: String,
    pub priority: i32,
    execute: BoxFuture<'static, AppResult<T>>,
}

impl<T> Task<T> {
    pub fn new<F>(id: impl Into<String>, execute: F) -> Self
    where
        F: Future<Output = AppResult<T>> + Send + 'static,
    {
        Self {
            id: id.into(),
            priority: 0,
            execute: Box::pin(execute),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// 单个任务的执行结果
#[derive(Debug)]
pub enum TaskResult<T> {
    Succeeded(T),
    Failed(PipelineError),
}

impl<T> TaskResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Succeeded(_))
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            TaskResult::Failed(e) => Some(e),
            TaskResult::Succeeded(_) => None,
        }
    }

    pub fn into_result(self) -> AppResult<T> {
        match self {
            TaskResult::Succeeded(v) => Ok(v),
            TaskResult::Failed(e) => Err(e),
        }
    }
}

/// 任务结果及耗时
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub id: String,
    pub result: TaskResult<T>,
    pub duration: Duration,
}

/// 一次运行的统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
    /// 成功率（百分比）
    pub success_rate: f64,
}

/// 任务完成观察者
pub trait TaskObserver: Send + Sync {
    /// 单个任务结束
    fn on_task_complete(&self, _id: &str, _error: Option<&PipelineError>, _duration: Duration) {}

    /// 已完成数 / 总数
    fn on_progress(&self, _completed: usize, _total: usize) {}
}

/// 任务调度器
#[derive(Clone, Default)]
pub struct TaskScheduler {
    observer: Option<Arc<dyn TaskObserver>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: Arc<dyn TaskObserver>) -> Self {
        Self {
            observer: Some(observer),
        }
    }

    /// 运行全部任务，返回按完成顺序排列的结果
    ///
    /// `max_concurrent` 为 0 时按 1 处理。
    pub async fn run<T: Send + 'static>(
        &self,
        mut tasks: Vec<Task<T>>,
        max_concurrent: usize,
    ) -> Vec<TaskOutcome<T>> {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        let max_concurrent = max_concurrent.max(1);
        info!(
            "[TaskScheduler] 开始执行 {} 个任务，最大并发数: {}",
            total, max_concurrent
        );

        tasks.sort_by_key(|task| Reverse(task.priority));

        let mut running = stream::iter(tasks)
            .map(execute_task)
            .buffer_unordered(max_concurrent);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = running.next().await {
            if let Some(observer) = &self.observer {
                observer.on_task_complete(&outcome.id, outcome.result.error(), outcome.duration);
            }
            outcomes.push(outcome);
            if let Some(observer) = &self.observer {
                observer.on_progress(outcomes.len(), total);
            }
        }

        info!("[TaskScheduler] 所有任务完成");
        outcomes
    }

    /// 汇总运行结果
    pub fn stats<T>(outcomes: &[TaskOutcome<T>]) -> RunStatistics {
        let total = outcomes.len();
        let successful = outcomes.iter().filter(|o| o.result.is_success()).count();
        let total_duration: Duration = outcomes.iter().map(|o| o.duration).sum();
        let total_duration_ms = total_duration.as_millis() as u64;

        let (avg_duration_ms, success_rate) = if total > 0 {
            (
                total_duration_ms as f64 / total as f64,
                successful as f64 / total as f64 * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        RunStatistics {
            total,
            successful,
            failed: total - successful,
            total_duration_ms,
            avg_duration_ms,
            success_rate,
        }
    }
}

/// 在独立任务中执行，panic 被转换为失败结果
async fn execute_task<T: Send + 'static>(task: Task<T>) -> TaskOutcome<T> {
    let Task { id, execute, .. } = task;
    let started = Instant::now();
    debug!("[TaskScheduler] 开始任务: {}", id);

    let result = match tokio::spawn(execute).await {
        Ok(Ok(value)) => TaskResult::Succeeded(value),
        Ok(Err(e)) => {
            warn!("[TaskScheduler] 任务 {} 失败: {}", id, e);
            TaskResult::Failed(e)
        }
        Err(join_err) => {
            warn!("[TaskScheduler] 任务 {} 异常终止: {}", id, join_err);
            TaskResult::Failed(PipelineError::TaskPanicked {
                task: id.clone(),
                message: join_err.to_string(),
            })
        }
    };

    TaskOutcome {
        id,
        result,
        duration: started.elapsed(),
    }
}
