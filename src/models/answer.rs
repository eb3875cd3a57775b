use serde::{Deserialize, Serialize};

/// 从 OCR 文本中提取的学生答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedAnswer {
    pub question_id: String,
    pub user_answer: String,
    pub confidence: f64,
}

/// 标准答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardAnswer {
    pub question_id: String,
    pub correct_answer: String,
    pub points: f64,
    #[serde(default)]
    pub knowledge_points: Vec<String>,
}

/// 标准答案集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    pub answers: Vec<StandardAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl AnswerSet {
    /// 满分
    pub fn max_score(&self) -> f64 {
        self.answers.iter().map(|a| a.points).sum()
    }

    /// 示例答案集
    ///
    /// 选项和知识点按题号轮换，结果可复现。
    pub fn sample(question_count: usize) -> Self {
        const OPTIONS: [&str; 4] = ["A", "B", "C", "D"];
        const KNOWLEDGE_POOL: [[&str; 2]; 5] = [
            ["语法", "时态"],
            ["阅读", "理解"],
            ["听力", "对话"],
            ["完形", "填空"],
            ["逻辑", "推理"],
        ];

        let answers = (1..=question_count)
            .map(|i| StandardAnswer {
                question_id: i.to_string(),
                correct_answer: OPTIONS[(i * 7) % OPTIONS.len()].to_string(),
                points: 2.0,
                knowledge_points: KNOWLEDGE_POOL[i % KNOWLEDGE_POOL.len()]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            })
            .collect();

        Self {
            id: format!("sample-{}", question_count),
            name: format!("示例答案集 ({}题)", question_count),
            description: format!("包含 {} 道选择题的示例答案集", question_count),
            subject: "英语".to_string(),
            answers,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// 校验答案集，返回全部问题
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push("缺少答案集 ID".to_string());
        }
        if self.name.trim().is_empty() {
            errors.push("缺少答案集名称".to_string());
        }
        if self.answers.is_empty() {
            errors.push("答案列表为空".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for (i, answer) in self.answers.iter().enumerate() {
            let n = i + 1;
            if answer.question_id.trim().is_empty() {
                errors.push(format!("第 {} 条答案缺少题号", n));
            } else if !seen.insert(answer.question_id.as_str()) {
                errors.push(format!("第 {} 条答案题号重复: {}", n, answer.question_id));
            }
            if answer.correct_answer.trim().is_empty() {
                errors.push(format!("第 {} 条答案缺少标准答案", n));
            }
            if !answer.points.is_finite() || answer.points <= 0.0 {
                errors.push(format!("第 {} 条答案分值必须大于 0", n));
            }
        }

        errors
    }
}

/// 能力维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Listening,
    Grammar,
    Reading,
    Cloze,
    Logic,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Listening,
        Dimension::Grammar,
        Dimension::Reading,
        Dimension::Cloze,
        Dimension::Logic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Listening => "听力",
            Dimension::Grammar => "语法",
            Dimension::Reading => "阅读",
            Dimension::Cloze => "完形",
            Dimension::Logic => "逻辑",
        }
    }
}

/// 错题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongAnswer {
    pub question_id: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub knowledge_points: Vec<String>,
}

/// 维度得分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionScore {
    pub dimension: Dimension,
    pub score: f64,
    pub max_score: f64,
}

/// 评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    pub total_score: f64,
    pub max_score: f64,
    /// 正确率（百分比）
    pub accuracy: f64,
    pub correct_count: usize,
    pub wrong_count: usize,
    pub wrong_answers: Vec<WrongAnswer>,
    pub dimension_scores: Vec<DimensionScore>,
}
