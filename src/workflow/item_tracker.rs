//! 条目状态跟踪
//!
//! 批次内所有条目的状态保存在一处，每次变化都推送给订阅者。

use crate::infrastructure::RunStatistics;
use crate::models::PipelineItem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;

/// 批次事件
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// 条目状态或进度发生变化
    ItemUpdated(PipelineItem),
    /// 已完成条目数 / 总数
    Progress { completed: usize, total: usize },
    /// 批次结束
    Finished(RunStatistics),
}

/// 条目状态跟踪器，克隆后共享同一份状态
#[derive(Clone)]
pub struct ItemTracker {
    items: Arc<Mutex<Vec<PipelineItem>>>,
    events: Option<UnboundedSender<BatchEvent>>,
}

impl ItemTracker {
    pub fn new(items: Vec<PipelineItem>, events: Option<UnboundedSender<BatchEvent>>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
            events,
        }
    }

    /// 修改某个条目并推送更新
    pub fn update(&self, slot: usize, change: impl FnOnce(&mut PipelineItem)) {
        let updated = {
            let mut items = self.lock();
            items.get_mut(slot).map(|item| {
                change(item);
                item.clone()
            })
        };

        if let Some(item) = updated {
            self.emit(BatchEvent::ItemUpdated(item));
        }
    }

    /// 推送事件；订阅者已退出时忽略
    pub fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    pub fn get(&self, slot: usize) -> Option<PipelineItem> {
        self.lock().get(slot).cloned()
    }

    pub fn snapshot(&self) -> Vec<PipelineItem> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PipelineItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemStatus, Stage};
    use tokio::sync::mpsc;

    #[test]
    fn test_update_emits_snapshot() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = ItemTracker::new(vec![PipelineItem::new("i-1", "a.jpg")], Some(tx));

        tracker.update(0, PipelineItem::start);
        tracker.update(0, |item| item.finish_stage(Stage::Compress));
        // 越界的更新被忽略
        tracker.update(5, PipelineItem::start);

        match rx.try_recv().unwrap() {
            BatchEvent::ItemUpdated(item) => assert_eq!(item.status, ItemStatus::Processing),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.try_recv().unwrap() {
            BatchEvent::ItemUpdated(item) => assert_eq!(item.progress, 30),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.get(0).unwrap().progress, 30);
    }

    #[test]
    fn test_dropped_subscriber_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let tracker = ItemTracker::new(vec![PipelineItem::new("i-1", "a.jpg")], Some(tx));
        tracker.update(0, PipelineItem::start);
        assert_eq!(tracker.snapshot()[0].status, ItemStatus::Processing);
    }
}
