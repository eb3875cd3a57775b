//! 批量条目处理器 - 编排层
//!
//! ## 职责
//!
//! 把一批答题卡交给调度器，每张答题卡是一个工作单元。
//!
//! ## 核心功能
//!
//! 1. **并发控制**：最多 `max_concurrent` 个条目同时处理，完成一个立即补位
//! 2. **状态跟踪**：每个条目的阶段与进度推送给订阅者
//! 3. **错误隔离**：单个条目失败只影响它自己
//! 4. **全局统计**：汇总运行统计与成绩概况
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个条目的细节，委托 `workflow::ItemFlow`
//! - **无业务逻辑**：只做调度和统计

use crate::infrastructure::{
    RunStatistics, Task, TaskObserver, TaskResult, TaskScheduler, DEFAULT_MAX_CONCURRENT,
};
use crate::models::{BatchInput, ItemStatus, PipelineItem};
use crate::utils::logging::{log_batch_start, log_progress};
use crate::workflow::{BatchEvent, ItemCtx, ItemFlow, ItemTracker};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::error;

/// 及格线
const PASS_SCORE: f64 = 60.0;
/// 优秀线
const EXCELLENT_SCORE: f64 = 90.0;

/// 批量处理选项
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// 同时处理的条目数
    pub max_concurrent: usize,
    /// 进度事件订阅
    pub progress: Option<UnboundedSender<BatchEvent>>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            progress: None,
        }
    }
}

/// 单个条目的失败记录
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    pub item_id: String,
    pub file_name: String,
    pub message: String,
}

/// 成绩概况（只统计完成的条目）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub completed: usize,
    pub average_score: f64,
    /// 及格率（百分比）
    pub pass_rate: f64,
    /// 优秀率（百分比）
    pub excellent_rate: f64,
}

impl BatchSummary {
    pub fn from_items(items: &[PipelineItem]) -> Self {
        let scores: Vec<f64> = items
            .iter()
            .filter(|i| i.status == ItemStatus::Completed)
            .filter_map(|i| i.result.as_ref().map(|r| r.score))
            .collect();

        if scores.is_empty() {
            return Self::default();
        }

        let count = scores.len() as f64;
        let rate = |line: f64| scores.iter().filter(|s| **s >= line).count() as f64 / count * 100.0;

        Self {
            completed: scores.len(),
            average_score: scores.iter().sum::<f64>() / count,
            pass_rate: rate(PASS_SCORE),
            excellent_rate: rate(EXCELLENT_SCORE),
        }
    }
}

/// 批量处理结果
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub items: Vec<PipelineItem>,
    pub errors: Vec<ItemError>,
    pub statistics: RunStatistics,
    pub summary: BatchSummary,
}

/// 把调度器的进度转发给订阅者
struct ProgressForwarder {
    tracker: ItemTracker,
}

impl TaskObserver for ProgressForwarder {
    fn on_progress(&self, completed: usize, total: usize) {
        log_progress(completed, total);
        self.tracker.emit(BatchEvent::Progress { completed, total });
    }
}

/// 批量处理器
#[derive(Clone)]
pub struct BatchProcessor {
    flow: ItemFlow,
}

impl BatchProcessor {
    pub fn new(flow: ItemFlow) -> Self {
        Self { flow }
    }

    /// 处理一批输入，所有条目都进入终止状态后返回
    pub async fn run_batch(&self, inputs: Vec<BatchInput>, options: BatchOptions) -> BatchReport {
        let total = inputs.len();
        let items = inputs
            .iter()
            .map(|input| PipelineItem::new(&input.id, &input.file_name))
            .collect();
        // 输入 ID 可能重复，任务 ID 附带槽位
        let task_ids: Vec<String> = inputs
            .iter()
            .enumerate()
            .map(|(slot, input)| format!("{}#{}", input.id, slot))
            .collect();
        let slots: HashMap<&str, usize> = task_ids
            .iter()
            .enumerate()
            .map(|(slot, id)| (id.as_str(), slot))
            .collect();

        let tracker = ItemTracker::new(items, options.progress);
        log_batch_start(total, options.max_concurrent.max(1));

        let tasks = inputs
            .into_iter()
            .enumerate()
            .zip(task_ids.iter().cloned())
            .map(|((slot, input), task_id)| {
                let flow = self.flow.clone();
                let tracker = tracker.clone();
                let ctx = ItemCtx::new(&input.id, slot, &input.file_name);
                Task::new(task_id, async move {
                    flow.run(&input, &ctx, &tracker).await
                })
            })
            .collect();

        let scheduler = TaskScheduler::with_observer(Arc::new(ProgressForwarder {
            tracker: tracker.clone(),
        }));
        let outcomes = scheduler.run(tasks, options.max_concurrent).await;

        // panic 的条目没有机会写入自己的失败状态
        for outcome in &outcomes {
            let slot = slots.get(outcome.id.as_str()).copied();
            if let (TaskResult::Failed(e), Some(slot)) = (&outcome.result, slot) {
                if tracker.get(slot).is_some_and(|item| !item.is_terminal()) {
                    let message = e.to_string();
                    tracker.update(slot, move |item| item.fail(message));
                }
            }
        }

        let statistics = TaskScheduler::stats(&outcomes);
        let items = tracker.snapshot();
        let errors: Vec<ItemError> = items
            .iter()
            .filter(|item| item.status == ItemStatus::Error)
            .map(|item| ItemError {
                item_id: item.id.clone(),
                file_name: item.file_name.clone(),
                message: item.error.clone().unwrap_or_default(),
            })
            .collect();

        for e in &errors {
            error!("[条目 {}] ❌ {}", e.file_name, e.message);
        }

        tracker.emit(BatchEvent::Finished(statistics.clone()));

        BatchReport {
            summary: BatchSummary::from_items(&items),
            items,
            errors,
            statistics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemResult;

    fn completed(score: f64) -> PipelineItem {
        let mut item = PipelineItem::new("i", "a.jpg");
        item.start();
        item.complete(ItemResult {
            report_id: "r".to_string(),
            score,
            accuracy: score,
            completed_at: String::new(),
        });
        item
    }

    #[test]
    fn test_summary_over_completed_items() {
        let mut failed = PipelineItem::new("f", "f.jpg");
        failed.start();
        failed.fail("OCR 失败");

        let items = vec![completed(50.0), completed(70.0), completed(95.0), failed];
        let summary = BatchSummary::from_items(&items);

        assert_eq!(summary.completed, 3);
        assert!((summary.average_score - 71.666).abs() < 0.01);
        assert!((summary.pass_rate - 66.666).abs() < 0.01);
        assert!((summary.excellent_rate - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_summary_empty() {
        assert_eq!(BatchSummary::from_items(&[]), BatchSummary::default());
    }
}
