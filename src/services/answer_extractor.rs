//! 答案提取
//!
//! 支持 `1. A`、`1.A`、`1A`、`1 a` 等写法，题号重复时保留第一次出现的答案。

use crate::error::{AppResult, PipelineError};
use crate::models::{ExtractedAnswer, Stage};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

static ANSWER_PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn answer_pattern() -> AppResult<&'static Regex> {
    ANSWER_PATTERN
        .get_or_init(|| Regex::new(r"(?i)(\d+)[.\s]*([A-D])"))
        .as_ref()
        .map_err(|e| PipelineError::validation(Stage::Extract, e.to_string()))
}

/// 从 OCR 文本中提取选择题答案，按题号升序
pub fn extract_answers(text: &str, confidence: f64) -> AppResult<Vec<ExtractedAnswer>> {
    let pattern = answer_pattern()?;

    let mut seen = HashSet::new();
    let mut answers: Vec<(u64, ExtractedAnswer)> = Vec::new();

    for caps in pattern.captures_iter(text) {
        let question_id = &caps[1];
        // 超长数字串不是题号
        let Ok(number) = question_id.parse::<u64>() else {
            continue;
        };
        if !seen.insert(number) {
            continue;
        }
        answers.push((
            number,
            ExtractedAnswer {
                question_id: number.to_string(),
                user_answer: caps[2].to_ascii_uppercase(),
                confidence,
            },
        ));
    }

    answers.sort_by_key(|(number, _)| *number);
    Ok(answers.into_iter().map(|(_, answer)| answer).collect())
}
