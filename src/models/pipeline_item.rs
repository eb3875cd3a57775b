//! 批量条目状态机
//!
//! `pending → processing → {completed, error}`，进入终止状态后不再变化。

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// 开始处理时的进度值
pub const PROGRESS_STARTED: u8 = 10;

/// 单个条目的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// 图像预处理（压缩 / 编码）
    Compress,
    /// OCR 识别
    Recognize,
    /// 答案提取
    Extract,
    /// 评分
    Grade,
    /// AI 错误分析
    Analyze,
    /// 学习路径生成
    Plan,
    /// 报告保存
    Persist,
}

impl Stage {
    /// 按执行顺序排列的全部阶段
    pub const ALL: [Stage; 7] = [
        Stage::Compress,
        Stage::Recognize,
        Stage::Extract,
        Stage::Grade,
        Stage::Analyze,
        Stage::Plan,
        Stage::Persist,
    ];

    /// 阶段完成后的进度检查点
    pub fn checkpoint(self) -> u8 {
        match self {
            Stage::Compress => 30,
            Stage::Recognize => 50,
            Stage::Extract => 60,
            Stage::Grade => 70,
            Stage::Analyze => 85,
            Stage::Plan => 95,
            Stage::Persist => 100,
        }
    }

    /// 阶段中文名称
    pub fn name(self) -> &'static str {
        match self {
            Stage::Compress => "图像处理",
            Stage::Recognize => "OCR 识别",
            Stage::Extract => "答案提取",
            Stage::Grade => "评分",
            Stage::Analyze => "错误分析",
            Stage::Plan => "学习路径",
            Stage::Persist => "保存报告",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 条目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Error)
    }
}

/// 条目完成后的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    /// 已保存报告的 ID
    pub report_id: String,
    pub score: f64,
    pub accuracy: f64,
    pub completed_at: String,
}

/// 批量中的一个条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineItem {
    pub id: String,
    pub file_name: String,
    /// 当前（或最后进入的）阶段
    pub stage: Option<Stage>,
    /// 0-100，单次运行内单调不减
    pub progress: u8,
    pub status: ItemStatus,
    pub result: Option<ItemResult>,
    pub error: Option<String>,
}

impl PipelineItem {
    pub fn new(id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            stage: None,
            progress: 0,
            status: ItemStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// pending → processing
    pub fn start(&mut self) {
        if self.status == ItemStatus::Pending {
            self.status = ItemStatus::Processing;
            self.raise_progress(PROGRESS_STARTED);
        }
    }

    /// 进入某个阶段
    pub fn enter_stage(&mut self, stage: Stage) {
        if !self.is_terminal() {
            self.stage = Some(stage);
        }
    }

    /// 阶段完成，推进到该阶段的检查点
    pub fn finish_stage(&mut self, stage: Stage) {
        if !self.is_terminal() {
            self.raise_progress(stage.checkpoint());
        }
    }

    /// processing → completed
    pub fn complete(&mut self, result: ItemResult) {
        if self.is_terminal() {
            return;
        }
        self.status = ItemStatus::Completed;
        self.raise_progress(100);
        self.result = Some(result);
    }

    /// → error，进度停留在最后一个成功的检查点
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.status = ItemStatus::Error;
        self.error = Some(message.into());
    }

    fn raise_progress(&mut self, value: u8) {
        self.progress = self.progress.max(value.min(100));
    }
}
