//! 模拟协作方
//!
//! 离线运行（mock 模式）和测试使用，结果可复现。

use crate::error::{AppResult, PipelineError};
use crate::models::{AnalysisResult, GradingResult, LearningPath, OcrResult, PathStage, ReportData, StoredReport};
use crate::services::{ErrorAnalyzer, PathGenerator, Recognizer, ReportStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

type FailurePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// 生成 `question_count` 道题的模拟识别文本，每行 5 题
pub fn mock_answer_text(question_count: usize) -> String {
    const OPTIONS: [char; 4] = ['A', 'B', 'C', 'D'];
    (1..=question_count)
        .map(|i| format!("{}. {}", i, OPTIONS[(i - 1) % OPTIONS.len()]))
        .collect::<Vec<_>>()
        .chunks(5)
        .map(|line| line.join("  "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 模拟 OCR
pub struct MockRecognizer {
    text: String,
    confidence: f64,
    delay: Duration,
    fail_when: Option<FailurePredicate>,
    calls: AtomicUsize,
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self {
            text: mock_answer_text(50),
            confidence: 0.95,
            delay: Duration::ZERO,
            fail_when: None,
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 对满足条件的图像（base64）返回识别失败
    pub fn fail_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Arc::new(predicate));
        self
    }

    /// 实际调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(&self, image_base64: &str) -> AppResult<OcrResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        debug!("[MockOCR] 模拟 OCR 识别...");

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail_when.as_ref().is_some_and(|f| f(image_base64)) {
            return Err(PipelineError::external("ocr", "模拟 OCR 识别失败"));
        }

        Ok(OcrResult {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}

/// 模拟错误分析，按错题数量给出不同档位的分析
#[derive(Default)]
pub struct MockAnalyzer {
    calls: AtomicUsize,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ErrorAnalyzer for MockAnalyzer {
    async fn analyze_errors(&self, grading: &GradingResult) -> AppResult<AnalysisResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        debug!("[MockAI] 模拟错误分析，错题数: {}", grading.wrong_count);

        let result = match grading.wrong_count {
            0..=5 => AnalysisResult {
                surface_issues: strings(&["个别题目粗心", "时间分配不均"]),
                root_causes: strings(&["基础扎实，偶有疏忽"]),
                ai_comment: "整体表现优秀！只有少量错题，主要是粗心导致。建议做题时更加细心，注意审题。"
                    .to_string(),
                knowledge_gaps: strings(&["审题技巧", "时间管理"]),
            },
            6..=15 => AnalysisResult {
                surface_issues: strings(&["部分知识点掌握不牢", "解题思路不够清晰", "时间管理需要改进"]),
                root_causes: strings(&["基础知识有漏洞", "缺乏系统训练"]),
                ai_comment: "你的基础还不错，但在某些知识点上需要加强。建议针对错题涉及的知识点进行专项训练。"
                    .to_string(),
                knowledge_gaps: strings(&["虚拟语气", "被动语态", "定语从句", "完形填空技巧"]),
            },
            _ => AnalysisResult {
                surface_issues: strings(&["多个知识点掌握不足", "解题方法欠缺", "基础概念模糊"]),
                root_causes: strings(&["基础知识薄弱", "缺乏系统学习", "练习量不足"]),
                ai_comment: "需要系统性地复习基础知识。建议从基础概念开始，逐步建立知识体系。"
                    .to_string(),
                knowledge_gaps: strings(&["基础语法", "词汇量", "阅读理解", "长难句分析"]),
            },
        };

        Ok(result)
    }
}

/// 模拟学习路径，固定三个阶段
#[derive(Default)]
pub struct MockPathGenerator {
    calls: AtomicUsize,
}

impl MockPathGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PathGenerator for MockPathGenerator {
    async fn generate_path(&self, analysis: &AnalysisResult) -> AppResult<LearningPath> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let weak = |i: usize, fallback: &str| {
            analysis
                .knowledge_gaps
                .get(i)
                .cloned()
                .unwrap_or_else(|| fallback.to_string())
        };

        let stage = |id: &str, title: &str, content: Vec<String>, duration: &str| PathStage {
            id: id.to_string(),
            title: title.to_string(),
            content,
            video_links: Vec::new(),
            duration: duration.to_string(),
        };

        Ok(LearningPath {
            stages: vec![
                stage(
                    "1",
                    "基础修复",
                    vec![
                        format!("复习 {} 的核心概念", weak(0, "基础语法")),
                        "完成 20 道基础练习题".to_string(),
                        format!("学习 {} 的应用方法", weak(1, "重点知识")),
                    ],
                    "2 周",
                ),
                stage(
                    "2",
                    "强化训练",
                    strings(&["综合题目训练（每天 10 题）", "完成 5 套模拟测试", "错题整理和分析"]),
                    "3 周",
                ),
                stage(
                    "3",
                    "冲刺提升",
                    strings(&["限时模拟考试", "查漏补缺", "考前心态调整"]),
                    "2 周",
                ),
            ],
            estimated_duration: "7 周".to_string(),
            target_score: 90.0,
        })
    }
}

/// 内存报告存储
#[derive(Default)]
pub struct MemoryReportStore {
    reports: Mutex<Vec<StoredReport>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn save_report(&self, report: &ReportData) -> AppResult<()> {
        self.reports
            .lock()
            .await
            .insert(0, StoredReport::from(report.clone()));
        Ok(())
    }

    async fn load_reports(&self) -> AppResult<Vec<StoredReport>> {
        Ok(self.reports.lock().await.clone())
    }
}
