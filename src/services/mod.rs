//! 业务能力层（Services）
//!
//! 只描述"我能做什么"，每次只处理一张答题卡的一个环节，不关心流程顺序。
//!
//! - 外部协作方以 trait 形式注入：[`Recognizer`]、[`ErrorAnalyzer`]、
//!   [`PathGenerator`]、[`ReportStore`]
//! - 本地能力：图像预处理、答案提取、评分、报告组装

pub mod answer_extractor;
pub mod answer_grader;
pub mod image_processor;
pub mod llm_service;
pub mod mock_service;
pub mod ocr_service;
pub mod report_builder;
pub mod report_store;

use crate::error::AppResult;
use crate::models::{AnalysisResult, GradingResult, LearningPath, OcrResult, ReportData, StoredReport};
use async_trait::async_trait;

pub use answer_extractor::extract_answers;
pub use answer_grader::grade;
pub use image_processor::{prepare_image, ImageLimits};
pub use llm_service::LlmService;
pub use mock_service::{MemoryReportStore, MockAnalyzer, MockPathGenerator, MockRecognizer};
pub use ocr_service::HttpOcrService;
pub use report_builder::build_report;
pub use report_store::FileReportStore;

/// OCR 识别
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// 识别 base64 编码的答题卡图像
    async fn recognize(&self, image_base64: &str) -> AppResult<OcrResult>;
}

/// 错误分析
#[async_trait]
pub trait ErrorAnalyzer: Send + Sync {
    async fn analyze_errors(&self, grading: &GradingResult) -> AppResult<AnalysisResult>;
}

/// 学习路径生成
#[async_trait]
pub trait PathGenerator: Send + Sync {
    async fn generate_path(&self, analysis: &AnalysisResult) -> AppResult<LearningPath>;
}

/// 报告持久化
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn save_report(&self, report: &ReportData) -> AppResult<()>;

    /// 全部历史报告，最新的在前
    async fn load_reports(&self) -> AppResult<Vec<StoredReport>>;
}
