//! 评分
//!
//! 对比提取出的答案与标准答案，按知识点关键词把每道题归入一个能力维度。

use crate::models::{
    Dimension, DimensionScore, ExtractedAnswer, GradingResult, StandardAnswer, WrongAnswer,
};
use phf::phf_map;
use std::collections::{HashMap, HashSet};

/// 维度关键词表，按 `Dimension::ALL` 的顺序匹配
static DIMENSION_KEYWORDS: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    "听力" => &["听力", "听", "listening"],
    "语法" => &["语法", "时态", "虚拟语气", "从句", "grammar"],
    "阅读" => &["阅读", "理解", "推理", "reading"],
    "完形" => &["完形", "填空", "cloze"],
    "逻辑" => &["逻辑", "推理", "判断", "logic"],
};

/// 根据知识点确定维度，都不匹配时归入语法
pub fn dimension_for(knowledge_points: &[String]) -> Dimension {
    for point in knowledge_points {
        let point = point.to_lowercase();
        for dimension in Dimension::ALL {
            let keywords = DIMENSION_KEYWORDS
                .get(dimension.name())
                .copied()
                .unwrap_or_default();
            if keywords.iter().any(|k| point.contains(k)) {
                return dimension;
            }
        }
    }
    Dimension::Grammar
}

/// 评分
///
/// 没有对应标准答案的题目直接跳过；正确率按提取到的答案数计算。
pub fn grade(user_answers: &[ExtractedAnswer], standard_answers: &[StandardAnswer]) -> GradingResult {
    let standards: HashMap<&str, &StandardAnswer> = standard_answers
        .iter()
        .map(|s| (s.question_id.as_str(), s))
        .collect();
    let max_score: f64 = standard_answers.iter().map(|s| s.points).sum();

    let mut total_score = 0.0;
    let mut correct_count = 0;
    let mut wrong_answers = Vec::new();
    let mut wrong_ids = HashSet::new();

    for answer in user_answers {
        let Some(standard) = standards.get(answer.question_id.as_str()) else {
            continue;
        };

        if answer.user_answer.eq_ignore_ascii_case(&standard.correct_answer) {
            total_score += standard.points;
            correct_count += 1;
        } else {
            wrong_ids.insert(answer.question_id.as_str());
            wrong_answers.push(WrongAnswer {
                question_id: answer.question_id.clone(),
                user_answer: answer.user_answer.clone(),
                correct_answer: standard.correct_answer.clone(),
                knowledge_points: standard.knowledge_points.clone(),
            });
        }
    }

    let accuracy = if user_answers.is_empty() {
        0.0
    } else {
        correct_count as f64 / user_answers.len() as f64 * 100.0
    };

    // 维度得分
    let mut per_dimension: HashMap<Dimension, (f64, f64)> = HashMap::new();
    for answer in user_answers {
        let Some(standard) = standards.get(answer.question_id.as_str()) else {
            continue;
        };
        let entry = per_dimension
            .entry(dimension_for(&standard.knowledge_points))
            .or_default();
        entry.1 += standard.points;
        if !wrong_ids.contains(answer.question_id.as_str()) {
            entry.0 += standard.points;
        }
    }

    let dimension_scores = Dimension::ALL
        .iter()
        .filter_map(|d| {
            per_dimension
                .get(d)
                .filter(|(_, max)| *max > 0.0)
                .map(|(score, max)| DimensionScore {
                    dimension: *d,
                    score: *score,
                    max_score: *max,
                })
        })
        .collect();

    GradingResult {
        total_score,
        max_score,
        accuracy,
        correct_count,
        wrong_count: wrong_answers.len(),
        wrong_answers,
        dimension_scores,
    }
}
