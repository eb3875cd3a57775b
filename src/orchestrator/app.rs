//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：日志文件、缓存、请求队列、外部协作方
//! 2. **批量加载**：扫描输入目录中的答题卡图像
//! 3. **向下委托**：交给 `BatchProcessor` 处理整批条目
//! 4. **全局统计**：输出最终结果

use crate::config::Config;
use crate::infrastructure::{FileTier, RequestQueue, TieredCache};
use crate::models::{load_answer_set, load_batch_inputs, AnswerSet};
use crate::orchestrator::batch_processor::{BatchOptions, BatchProcessor, BatchReport};
use crate::services::{
    FileReportStore, HttpOcrService, LlmService, MockAnalyzer, MockPathGenerator, MockRecognizer,
};
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};
use crate::workflow::{BatchEvent, Collaborators, ItemFlow};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 示例答案集题目数量
const SAMPLE_QUESTION_COUNT: usize = 50;

/// 应用主结构
pub struct App {
    config: Config,
    processor: BatchProcessor,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        init_log_file(&config.output_log_file)?;

        log_startup(
            config.max_concurrent_items,
            config.queue_max_concurrent,
            config.mock_mode,
        );

        let cache = TieredCache::new(
            config.cache_config(),
            Arc::new(FileTier::new(&config.cache_dir)),
        );
        let queue = RequestQueue::new(config.queue_config());
        let collaborators = build_collaborators(&config)?;
        let answer_set = Arc::new(load_answers(&config).await?);

        let flow = ItemFlow::new(collaborators, cache, queue, answer_set)
            .with_image_limits(config.image_limits());

        Ok(Self {
            config,
            processor: BatchProcessor::new(flow),
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<Option<BatchReport>> {
        info!("\n📁 正在扫描待处理的答题卡...");
        let inputs = load_batch_inputs(&self.config.input_folder).await?;

        if inputs.is_empty() {
            warn!("⚠️ 没有找到待处理的答题卡图像，程序结束");
            return Ok(None);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let BatchEvent::ItemUpdated(item) = event {
                    debug!(
                        "[条目 {}] {:?} {}%",
                        item.file_name, item.status, item.progress
                    );
                }
            }
        });

        let options = BatchOptions {
            max_concurrent: self.config.max_concurrent_items,
            progress: Some(tx),
        };
        let report = self.processor.run_batch(inputs, options).await;
        let _ = listener.await;

        print_final_stats(
            report.statistics.successful,
            report.statistics.failed,
            report.statistics.total,
            &self.config.output_log_file,
        );
        info!(
            "📈 平均分: {:.1}，及格率: {:.1}%，优秀率: {:.1}%",
            report.summary.average_score, report.summary.pass_rate, report.summary.excellent_rate
        );

        Ok(Some(report))
    }
}

/// 按配置选择模拟服务或真实服务
fn build_collaborators(config: &Config) -> Result<Collaborators> {
    let report_store = Arc::new(FileReportStore::new(&config.report_file, config.max_reports));

    if config.mock_mode {
        return Ok(Collaborators {
            recognizer: Arc::new(MockRecognizer::new()),
            analyzer: Arc::new(MockAnalyzer::new()),
            path_generator: Arc::new(MockPathGenerator::new()),
            report_store,
        });
    }

    let ocr = HttpOcrService::new(
        config.ocr_api_base_url.clone(),
        config.ocr_api_key.clone(),
        config.request_timeout(),
    )?;
    let llm = Arc::new(LlmService::new(config));

    Ok(Collaborators {
        recognizer: Arc::new(ocr),
        analyzer: llm.clone(),
        path_generator: llm,
        report_store,
    })
}

async fn load_answers(config: &Config) -> Result<AnswerSet> {
    match &config.answer_set_file {
        Some(path) => load_answer_set(Path::new(path)).await,
        None => {
            info!("未指定答案集，使用 {} 题示例答案集", SAMPLE_QUESTION_COUNT);
            Ok(AnswerSet::sample(SAMPLE_QUESTION_COUNT))
        }
    }
}
