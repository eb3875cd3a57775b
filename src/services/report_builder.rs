//! 报告组装

use crate::models::{
    AbilityData, AnalysisData, AnalysisResult, Dimension, GradingResult, KnowledgePoint,
    LearningPath, ReportData, ScoreData,
};
use chrono::{DateTime, Utc};

/// 全国 / 省 / 市参考平均分
const NATIONAL_AVERAGE: f64 = 75.0;
const PROVINCE_AVERAGE: f64 = 78.0;
const CITY_AVERAGE: f64 = 80.0;

/// 没有作答数据的维度显示的默认能力值
const DEFAULT_ABILITY: u32 = 60;

/// 由评分、分析和学习路径组装完整报告
pub fn build_report(
    id: impl Into<String>,
    grading: &GradingResult,
    analysis: &AnalysisResult,
    path: &LearningPath,
    timestamp: DateTime<Utc>,
) -> ReportData {
    ReportData {
        id: id.into(),
        timestamp: timestamp.to_rfc3339(),
        score: ScoreData {
            score: grading.total_score,
            accuracy: graded_accuracy(grading),
            national: NATIONAL_AVERAGE,
            province: PROVINCE_AVERAGE,
            city: CITY_AVERAGE,
        },
        ability: ability(grading),
        analysis: AnalysisData {
            surface_issues: analysis.surface_issues.clone(),
            root_causes: analysis.root_causes.clone(),
            ai_comment: analysis.ai_comment.clone(),
        },
        knowledge: analysis
            .knowledge_gaps
            .iter()
            .enumerate()
            .map(|(i, gap)| KnowledgePoint {
                id: format!("k{}", i + 1),
                name: gap.clone(),
                difficulty: 2 + (i % 3) as u8,
                mastered: false,
                detail: format!("需要加强 {} 相关知识", gap),
            })
            .collect(),
        path: path.stages.clone(),
    }
}

/// 已评分题目中的正确率
pub fn graded_accuracy(grading: &GradingResult) -> f64 {
    let graded = grading.correct_count + grading.wrong_count;
    if graded == 0 {
        0.0
    } else {
        grading.correct_count as f64 / graded as f64 * 100.0
    }
}

fn ability(grading: &GradingResult) -> AbilityData {
    let percent = |dimension: Dimension| {
        grading
            .dimension_scores
            .iter()
            .find(|d| d.dimension == dimension && d.max_score > 0.0)
            .map(|d| (d.score / d.max_score * 100.0).round() as u32)
            .unwrap_or(DEFAULT_ABILITY)
    };

    AbilityData {
        listening: percent(Dimension::Listening),
        grammar: percent(Dimension::Grammar),
        reading: percent(Dimension::Reading),
        cloze: percent(Dimension::Cloze),
        logic: percent(Dimension::Logic),
    }
}
