use serde::{Deserialize, Serialize};

/// OCR 识别结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f64,
}

/// AI 错误分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// 表层病灶
    pub surface_issues: Vec<String>,
    /// 深层病根
    pub root_causes: Vec<String>,
    /// AI 点评
    pub ai_comment: String,
    /// 知识盲区
    #[serde(default)]
    pub knowledge_gaps: Vec<String>,
}

/// 学习路径阶段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStage {
    pub id: String,
    pub title: String,
    pub content: Vec<String>,
    #[serde(default)]
    pub video_links: Vec<String>,
    pub duration: String,
}

/// 学习路径
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPath {
    pub stages: Vec<PathStage>,
    #[serde(default)]
    pub estimated_duration: String,
    #[serde(default)]
    pub target_score: f64,
}

/// 得分数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreData {
    pub score: f64,
    pub accuracy: f64,
    pub national: f64,
    pub province: f64,
    pub city: f64,
}

/// 五维能力（0-100）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityData {
    pub listening: u32,
    pub grammar: u32,
    pub reading: u32,
    pub cloze: u32,
    pub logic: u32,
}

/// 报告中的分析部分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisData {
    pub surface_issues: Vec<String>,
    pub root_causes: Vec<String>,
    pub ai_comment: String,
}

/// 知识点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgePoint {
    pub id: String,
    pub name: String,
    /// 难度星级 1-5
    pub difficulty: u8,
    pub mastered: bool,
    pub detail: String,
}

/// 完整报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub id: String,
    /// ISO 8601
    pub timestamp: String,
    pub score: ScoreData,
    pub ability: AbilityData,
    pub analysis: AnalysisData,
    pub knowledge: Vec<KnowledgePoint>,
    pub path: Vec<PathStage>,
}

/// 历史记录中保存的报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: String,
    pub timestamp: String,
    pub score: f64,
    pub accuracy: f64,
    pub data: ReportData,
}

impl From<ReportData> for StoredReport {
    fn from(report: ReportData) -> Self {
        Self {
            id: report.id.clone(),
            timestamp: report.timestamp.clone(),
            score: report.score.score,
            accuracy: report.score.accuracy,
            data: report,
        }
    }
}

/// 历史报告统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatistics {
    pub total_reports: usize,
    pub average_score: f64,
    pub highest_score: f64,
    pub lowest_score: f64,
    pub average_accuracy: f64,
}
