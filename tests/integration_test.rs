use answer_sheet_pipeline::infrastructure::{CacheConfig, FileTier, QueueConfig};
use answer_sheet_pipeline::models::{AnswerSet, OcrResult, ReportData, StoredReport};
use answer_sheet_pipeline::services::{
    prepare_image, ImageLimits, MemoryReportStore, MockAnalyzer, MockPathGenerator,
    MockRecognizer, Recognizer, ReportStore,
};
use answer_sheet_pipeline::{
    AppResult, BatchEvent, BatchInput, BatchOptions, BatchProcessor, Collaborators, ItemFlow,
    ItemStatus, RequestQueue, TieredCache,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Harness {
    processor: BatchProcessor,
    recognizer: Arc<MockRecognizer>,
    analyzer: Arc<MockAnalyzer>,
    store: Arc<MemoryReportStore>,
}

fn payload(index: usize) -> Vec<u8> {
    format!("answer-sheet-{}", index).into_bytes()
}

fn inputs(count: usize) -> Vec<BatchInput> {
    (1..=count)
        .map(|i| BatchInput::new(format!("item-{}", i), format!("sheet_{}.jpg", i), payload(i)))
        .collect()
}

fn processor_with(
    cache_dir: &Path,
    collaborators: Collaborators,
    queue_config: QueueConfig,
) -> BatchProcessor {
    let cache = TieredCache::new(CacheConfig::default(), Arc::new(FileTier::new(cache_dir)));
    let queue = RequestQueue::new(queue_config);
    let flow = ItemFlow::new(collaborators, cache, queue, Arc::new(AnswerSet::sample(50)));
    BatchProcessor::new(flow)
}

fn mock_collaborators(
    recognizer: Arc<dyn Recognizer>,
    report_store: Arc<dyn ReportStore>,
) -> Collaborators {
    Collaborators {
        recognizer,
        analyzer: Arc::new(MockAnalyzer::new()),
        path_generator: Arc::new(MockPathGenerator::new()),
        report_store,
    }
}

/// 指定图像的识别一直不返回
struct StallingRecognizer {
    stalled_image: String,
    inner: MockRecognizer,
}

#[async_trait]
impl Recognizer for StallingRecognizer {
    async fn recognize(&self, image_base64: &str) -> AppResult<OcrResult> {
        if image_base64 == self.stalled_image {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        self.inner.recognize(image_base64).await
    }
}

/// 保存槽位 0 的报告时 panic
struct PanickingStore {
    inner: MemoryReportStore,
}

#[async_trait]
impl ReportStore for PanickingStore {
    async fn save_report(&self, report: &ReportData) -> AppResult<()> {
        if report.id.ends_with("-0") {
            panic!("报告存储崩溃: {}", report.id);
        }
        self.inner.save_report(report).await
    }

    async fn load_reports(&self) -> AppResult<Vec<StoredReport>> {
        self.inner.load_reports().await
    }
}

/// 第 4、7 张答题卡识别失败
fn harness(cache_dir: &Path) -> Harness {
    let failing: HashSet<String> = [4, 7]
        .iter()
        .map(|i| prepare_image(&payload(*i), ImageLimits::default()).unwrap())
        .collect();

    let recognizer = Arc::new(
        MockRecognizer::new()
            .with_delay(Duration::from_millis(10))
            .fail_when(move |image| failing.contains(image)),
    );
    let analyzer = Arc::new(MockAnalyzer::new());
    let store = Arc::new(MemoryReportStore::new());

    let collaborators = Collaborators {
        recognizer: recognizer.clone(),
        analyzer: analyzer.clone(),
        path_generator: Arc::new(MockPathGenerator::new()),
        report_store: store.clone(),
    };
    let processor = processor_with(cache_dir, collaborators, QueueConfig::default());

    Harness {
        processor,
        recognizer,
        analyzer,
        store,
    }
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());

    let report = h
        .processor
        .run_batch(
            inputs(10),
            BatchOptions {
                max_concurrent: 3,
                progress: None,
            },
        )
        .await;

    assert_eq!(report.statistics.total, 10);
    assert_eq!(report.statistics.successful, 8);
    assert_eq!(report.statistics.failed, 2);
    assert!((report.statistics.success_rate - 80.0).abs() < 1e-9);

    let failed_ids: Vec<&str> = report.errors.iter().map(|e| e.item_id.as_str()).collect();
    assert_eq!(failed_ids, vec!["item-4", "item-7"]);
    assert!(report.errors.iter().all(|e| !e.message.is_empty()));

    assert!(report.items.iter().all(|item| item.is_terminal()));
    let completed: Vec<_> = report
        .items
        .iter()
        .filter(|item| item.status == ItemStatus::Completed)
        .collect();
    assert_eq!(completed.len(), 8);
    assert!(completed.iter().all(|item| item.progress == 100));

    let saved = h.store.load_reports().await.unwrap();
    assert_eq!(saved.len(), 8);
    let saved_ids: HashSet<&str> = saved.iter().map(|r| r.id.as_str()).collect();
    for item in &completed {
        let result = item.result.as_ref().unwrap();
        assert!(saved_ids.contains(result.report_id.as_str()));
    }
    assert_eq!(report.summary.completed, 8);
}

#[tokio::test]
async fn test_rerun_hits_cache() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());

    h.processor
        .run_batch(inputs(10), BatchOptions::default())
        .await;
    assert_eq!(h.recognizer.calls(), 10);
    let analyzer_calls = h.analyzer.calls();

    let report = h
        .processor
        .run_batch(inputs(10), BatchOptions::default())
        .await;

    // 失败的识别不会被缓存，只有这两张会再次请求
    assert_eq!(h.recognizer.calls(), 12);
    assert_eq!(h.analyzer.calls(), analyzer_calls);
    assert_eq!(report.statistics.successful, 8);
}

#[tokio::test]
async fn test_progress_events() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    let (tx, mut rx) = mpsc::unbounded_channel();

    h.processor
        .run_batch(
            inputs(10),
            BatchOptions {
                max_concurrent: 3,
                progress: Some(tx),
            },
        )
        .await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let progress: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Progress { completed, total } => {
                assert_eq!(*total, 10);
                Some(*completed)
            }
            _ => None,
        })
        .collect();
    assert_eq!(progress, (1..=10).collect::<Vec<_>>());

    match events.last() {
        Some(BatchEvent::Finished(stats)) => assert_eq!(stats.total, 10),
        other => panic!("最后一个事件应为 Finished: {:?}", other),
    }

    // 同时处于处理中的条目不超过 3 个
    let mut running = HashSet::new();
    let mut peak = 0;
    for event in &events {
        if let BatchEvent::ItemUpdated(item) = event {
            if item.status == ItemStatus::Processing {
                running.insert(item.id.clone());
            } else if item.is_terminal() {
                running.remove(&item.id);
            }
            peak = peak.max(running.len());
        }
    }
    assert!(peak >= 1 && peak <= 3, "peak = {}", peak);
}

#[tokio::test]
async fn test_request_timeout_fails_only_that_item() {
    let dir = tempfile::tempdir().unwrap();
    let recognizer = Arc::new(StallingRecognizer {
        stalled_image: prepare_image(&payload(2), ImageLimits::default()).unwrap(),
        inner: MockRecognizer::new(),
    });
    let store = Arc::new(MemoryReportStore::new());
    let processor = processor_with(
        dir.path(),
        mock_collaborators(recognizer, store.clone()),
        QueueConfig {
            timeout: Duration::from_millis(200),
            ..QueueConfig::default()
        },
    );

    let report = processor.run_batch(inputs(4), BatchOptions::default()).await;

    assert_eq!(report.statistics.successful, 3);
    assert_eq!(report.statistics.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].item_id, "item-2");
    assert!(report.errors[0].message.contains("请求超时"));

    let item = &report.items[1];
    assert_eq!(item.status, ItemStatus::Error);
    assert!(report
        .items
        .iter()
        .filter(|i| i.id != "item-2")
        .all(|i| i.status == ItemStatus::Completed));
    assert_eq!(store.load_reports().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_empty_payload_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let recognizer = Arc::new(MockRecognizer::new());
    let processor = processor_with(
        dir.path(),
        mock_collaborators(recognizer.clone(), Arc::new(MemoryReportStore::new())),
        QueueConfig::default(),
    );

    let mut batch = inputs(3);
    batch[2].payload.clear();

    let report = processor.run_batch(batch, BatchOptions::default()).await;

    assert_eq!(report.statistics.successful, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].item_id, "item-3");
    assert!(report.errors[0].message.contains("图像内容为空"));
    assert_eq!(report.items[2].status, ItemStatus::Error);
    // 校验失败的条目不会发起识别
    assert_eq!(recognizer.calls(), 2);
}

#[tokio::test]
async fn test_panicked_item_with_duplicate_id() {
    let dir = tempfile::tempdir().unwrap();
    let processor = processor_with(
        dir.path(),
        mock_collaborators(
            Arc::new(MockRecognizer::new()),
            Arc::new(PanickingStore {
                inner: MemoryReportStore::new(),
            }),
        ),
        QueueConfig::default(),
    );

    let batch = vec![
        BatchInput::new("dup", "first.jpg", payload(1)),
        BatchInput::new("dup", "second.jpg", payload(2)),
    ];
    let report = processor.run_batch(batch, BatchOptions::default()).await;

    assert_eq!(report.statistics.failed, 1);
    assert_eq!(report.items[0].status, ItemStatus::Error);
    assert_eq!(report.items[1].status, ItemStatus::Completed);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file_name, "first.jpg");
    assert!(report.errors[0].message.contains("异常终止"));
}
