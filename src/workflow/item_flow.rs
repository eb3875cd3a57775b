//! 条目处理流程 - 流程层
//!
//! 核心职责：定义"一张答题卡"的完整处理流程
//!
//! 流程顺序：
//! 1. 图像处理（校验 + 编码）
//! 2. OCR 识别（缓存 → 队列，高优先级）
//! 3. 答案提取
//! 4. 评分
//! 5. 错误分析（缓存 → 队列）
//! 6. 学习路径（缓存 → 队列）
//! 7. 保存报告

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::{cache_key, RequestPriority, RequestQueue, TieredCache};
use crate::models::{AnswerSet, BatchInput, ItemResult, PipelineItem, Stage};
use crate::services::{
    build_report, extract_answers, grade, prepare_image, report_builder::graded_accuracy,
    ErrorAnalyzer, ImageLimits, PathGenerator, Recognizer, ReportStore,
};
use crate::utils::truncate_text;
use crate::workflow::item_ctx::ItemCtx;
use crate::workflow::item_tracker::ItemTracker;

/// 外部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn Recognizer>,
    pub analyzer: Arc<dyn ErrorAnalyzer>,
    pub path_generator: Arc<dyn PathGenerator>,
    pub report_store: Arc<dyn ReportStore>,
}

/// 条目处理流程
///
/// - 编排单个条目的全部阶段
/// - 远程调用先查缓存，未命中再经队列发出
/// - 只依赖业务能力（services）与基础设施（cache / queue）
#[derive(Clone)]
pub struct ItemFlow {
    collaborators: Collaborators,
    cache: TieredCache,
    queue: RequestQueue,
    answer_set: Arc<AnswerSet>,
    image_limits: ImageLimits,
}

impl ItemFlow {
    pub fn new(
        collaborators: Collaborators,
        cache: TieredCache,
        queue: RequestQueue,
        answer_set: Arc<AnswerSet>,
    ) -> Self {
        Self {
            collaborators,
            cache,
            queue,
            answer_set,
            image_limits: ImageLimits::default(),
        }
    }

    pub fn with_image_limits(mut self, limits: ImageLimits) -> Self {
        self.image_limits = limits;
        self
    }

    /// 运行完整流程，成功或失败都会写入条目的终止状态
    pub async fn run(
        &self,
        input: &BatchInput,
        ctx: &ItemCtx,
        tracker: &ItemTracker,
    ) -> AppResult<ItemResult> {
        tracker.update(ctx.slot, PipelineItem::start);
        info!("{} 🚀 开始处理", ctx);

        match self.run_stages(input, ctx, tracker).await {
            Ok(result) => {
                info!(
                    "{} ✅ 处理完成，得分: {}，正确率: {:.1}%",
                    ctx, result.score, result.accuracy
                );
                let completed = result.clone();
                tracker.update(ctx.slot, move |item| item.complete(completed));
                Ok(result)
            }
            Err(e) => {
                warn!("{} ❌ 处理失败: {}", ctx, e);
                let message = e.to_string();
                tracker.update(ctx.slot, move |item| item.fail(message));
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        input: &BatchInput,
        ctx: &ItemCtx,
        tracker: &ItemTracker,
    ) -> AppResult<ItemResult> {
        // 1. 图像处理
        let image = self
            .stage(ctx, tracker, Stage::Compress, async {
                prepare_image(&input.payload, self.image_limits)
            })
            .await?;

        // 2. OCR 识别
        let ocr = self
            .stage(ctx, tracker, Stage::Recognize, {
                let recognizer = self.collaborators.recognizer.clone();
                let key = cache_key("ocr", &image);
                let image = image.clone();
                self.cached_call(key, RequestPriority::High, async move {
                    recognizer.recognize(&image).await
                })
            })
            .await?;
        debug!("{} 识别文本: {}", ctx, truncate_text(&ocr.text, 50));

        // 3. 答案提取
        let answers = self
            .stage(ctx, tracker, Stage::Extract, async {
                extract_answers(&ocr.text, ocr.confidence)
            })
            .await?;
        debug!("{} 提取到 {} 个答案", ctx, answers.len());

        // 4. 评分
        let grading = self
            .stage(ctx, tracker, Stage::Grade, async {
                Ok(grade(&answers, &self.answer_set.answers))
            })
            .await?;

        // 5. 错误分析
        let analysis = self
            .stage(ctx, tracker, Stage::Analyze, async {
                let key = cache_key("analyze", &serde_json::to_string(&grading)?);
                let analyzer = self.collaborators.analyzer.clone();
                let grading = grading.clone();
                self.cached_call(key, RequestPriority::Normal, async move {
                    analyzer.analyze_errors(&grading).await
                })
                .await
            })
            .await?;

        // 6. 学习路径
        let path = self
            .stage(ctx, tracker, Stage::Plan, async {
                let key = cache_key("path", &serde_json::to_string(&analysis)?);
                let generator = self.collaborators.path_generator.clone();
                let analysis = analysis.clone();
                self.cached_call(key, RequestPriority::Normal, async move {
                    generator.generate_path(&analysis).await
                })
                .await
            })
            .await?;

        // 7. 保存报告
        self.stage(ctx, tracker, Stage::Persist, async {
            let now = chrono::Utc::now();
            let report_id = format!(
                "batch-report-{}-{}",
                now.timestamp_millis(),
                ctx.slot
            );
            let report = build_report(&report_id, &grading, &analysis, &path, now);
            self.collaborators.report_store.save_report(&report).await?;

            Ok(ItemResult {
                report_id,
                score: grading.total_score,
                accuracy: graded_accuracy(&grading),
                completed_at: now.to_rfc3339(),
            })
        })
        .await
    }

    /// 执行一个阶段并更新条目进度
    async fn stage<T, Fut>(
        &self,
        ctx: &ItemCtx,
        tracker: &ItemTracker,
        stage: Stage,
        work: Fut,
    ) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        tracker.update(ctx.slot, |item| item.enter_stage(stage));
        debug!("{} ▶ {}", ctx, stage.name());

        let value = work.await?;

        tracker.update(ctx.slot, |item| item.finish_stage(stage));
        Ok(value)
    }

    /// 先查缓存，未命中时经队列调用并写回缓存
    async fn cached_call<T, Fut>(
        &self,
        key: String,
        priority: RequestPriority,
        call: Fut,
    ) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        if let Some(hit) = self.cache.get::<T>(&key).await {
            debug!("缓存命中: {}", key);
            return Ok(hit);
        }

        let value = self.queue.enqueue(call, priority).await?;
        self.cache.set(&key, &value).await;
        Ok(value)
    }
}
