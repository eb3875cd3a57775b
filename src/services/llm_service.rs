//! LLM 服务 - 业务能力层
//!
//! 基于大模型的错误分析与学习路径生成。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（如 DeepSeek, Doubao 等）
//! - 模型只返回 JSON，解析后校验必需字段

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppResult, PipelineError};
use crate::models::{AnalysisResult, GradingResult, LearningPath, PathStage};
use crate::services::{ErrorAnalyzer, PathGenerator};

const SERVICE: &str = "llm";

const ANALYSIS_SYSTEM_PROMPT: &str = "你是一位专业的教育分析师，擅长分析学生的答题情况并提供个性化建议。\
请严格按照 JSON 格式返回分析结果，不要包含任何额外的文本。";

const PATH_SYSTEM_PROMPT: &str = "你是一位专业的学习规划师，擅长根据学生的薄弱环节制定个性化学习路径。\
请严格按照 JSON 格式返回学习路径，不要包含任何额外的文本。";

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API
/// - 构建提示词、解析并校验 JSON 响应
/// - 不关心缓存和排队
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（去掉首尾空白）
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| PipelineError::external(SERVICE, e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| PipelineError::external(SERVICE, e))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.7)
            .max_tokens(2000u32)
            .build()
            .map_err(|e| PipelineError::external(SERVICE, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            PipelineError::external(SERVICE, format!("LLM API 调用失败: {}", e))
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| PipelineError::external(SERVICE, "LLM 返回内容为空"))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl ErrorAnalyzer for LlmService {
    async fn analyze_errors(&self, grading: &GradingResult) -> AppResult<AnalysisResult> {
        let prompt = build_analysis_prompt(grading);
        let response = self
            .send_to_llm(&prompt, Some(ANALYSIS_SYSTEM_PROMPT))
            .await?;
        parse_analysis(&response)
    }
}

#[async_trait]
impl PathGenerator for LlmService {
    async fn generate_path(&self, analysis: &AnalysisResult) -> AppResult<LearningPath> {
        let prompt = build_path_prompt(analysis);
        let response = self.send_to_llm(&prompt, Some(PATH_SYSTEM_PROMPT)).await?;
        parse_learning_path(&response)
    }
}

// ========== 提示词 ==========

fn build_analysis_prompt(grading: &GradingResult) -> String {
    let dimensions: Vec<String> = grading
        .dimension_scores
        .iter()
        .map(|d| {
            let percent = if d.max_score > 0.0 {
                (d.score / d.max_score * 100.0).round()
            } else {
                0.0
            };
            format!(
                "- {}: {}/{} ({}%)",
                d.dimension.name(),
                d.score,
                d.max_score,
                percent
            )
        })
        .collect();

    let wrong: Vec<String> = grading
        .wrong_answers
        .iter()
        .enumerate()
        .map(|(i, w)| {
            format!(
                "{}. 题目 {}\n   - 学生答案: {}\n   - 正确答案: {}\n   - 涉及知识点: {}",
                i + 1,
                w.question_id,
                w.user_answer,
                w.correct_answer,
                w.knowledge_points.join(", ")
            )
        })
        .collect();

    format!(
        r#"请分析以下学生的答题情况：

## 总体情况
- 总分: {}/{}
- 正确率: {:.1}%
- 正确题数: {}
- 错误题数: {}

## 各维度得分
{}

## 错题详情
{}

请以 JSON 格式返回分析结果：
{{
  "surfaceIssues": ["表层问题1", "表层问题2", "表层问题3"],
  "rootCauses": ["深层原因1", "深层原因2"],
  "aiComment": "综合点评（200-500字，包含优势分析和改进建议）",
  "knowledgeGaps": [
    {{
      "knowledgePoint": "知识点名称",
      "difficulty": 3,
      "mastered": false,
      "detail": "详细说明该知识点的重要性和学习建议"
    }}
  ]
}}"#,
        grading.total_score,
        grading.max_score,
        grading.accuracy,
        grading.correct_count,
        grading.wrong_count,
        dimensions.join("\n"),
        wrong.join("\n")
    )
}

fn build_path_prompt(analysis: &AnalysisResult) -> String {
    let numbered = |items: &[String]| {
        items
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"基于以下错误分析，生成个性化学习路径：

## 表层问题
{}

## 深层原因
{}

## 知识点缺口
{}

要求：
1. 生成 3-5 个学习阶段
2. 每个阶段包含 3-5 个具体学习内容
3. 按照"基础修复 → 强化训练 → 冲刺提升"的顺序
4. 优先解决最薄弱的知识点

请以 JSON 格式返回：
{{
  "stages": [
    {{
      "id": "1",
      "title": "阶段标题",
      "content": ["具体学习内容1", "具体学习内容2", "具体学习内容3"],
      "videoLinks": [],
      "duration": "2周"
    }}
  ]
}}"#,
        numbered(&analysis.surface_issues),
        numbered(&analysis.root_causes),
        numbered(&analysis.knowledge_gaps)
    )
}

// ========== 响应解析 ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    surface_issues: Option<Vec<String>>,
    root_causes: Option<Vec<String>>,
    ai_comment: Option<String>,
    knowledge_gaps: Option<Vec<RawKnowledgeGap>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawKnowledgeGap {
    knowledge_point: Option<String>,
    difficulty: Option<f64>,
    mastered: Option<bool>,
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPath {
    stages: Option<Vec<RawStage>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStage {
    id: Option<String>,
    title: Option<String>,
    content: Option<Vec<String>>,
    video_links: Option<Vec<String>>,
    duration: Option<String>,
}

/// 去掉模型有时附带的 Markdown 代码块标记
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::external(SERVICE, message.into())
}

fn non_empty(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| invalid(format!("响应缺少 {}", field)))
}

/// 解析并校验错误分析响应
pub fn parse_analysis(response: &str) -> AppResult<AnalysisResult> {
    let raw: RawAnalysis = serde_json::from_str(strip_code_fence(response))
        .map_err(|e| invalid(format!("无法解析 AI 响应: {}", e)))?;

    let surface_issues = raw
        .surface_issues
        .ok_or_else(|| invalid("响应缺少 surfaceIssues"))?;
    let root_causes = raw.root_causes.ok_or_else(|| invalid("响应缺少 rootCauses"))?;
    let ai_comment = non_empty(raw.ai_comment, "aiComment")?;
    let gaps = raw
        .knowledge_gaps
        .ok_or_else(|| invalid("响应缺少 knowledgeGaps"))?;

    let mut knowledge_gaps = Vec::with_capacity(gaps.len());
    for gap in gaps {
        let name = non_empty(gap.knowledge_point, "knowledgePoint")?;
        match gap.difficulty {
            Some(d) if (1.0..=5.0).contains(&d) => {}
            _ => return Err(invalid(format!("知识点 {} 的难度必须在 1-5 之间", name))),
        }
        if gap.mastered.is_none() {
            return Err(invalid(format!("知识点 {} 缺少 mastered", name)));
        }
        non_empty(gap.detail, "detail")?;
        knowledge_gaps.push(name);
    }

    Ok(AnalysisResult {
        surface_issues,
        root_causes,
        ai_comment,
        knowledge_gaps,
    })
}

/// 解析并校验学习路径响应：3-5 个阶段，每阶段 3-5 条内容
pub fn parse_learning_path(response: &str) -> AppResult<LearningPath> {
    let raw: RawPath = serde_json::from_str(strip_code_fence(response))
        .map_err(|e| invalid(format!("无法解析 AI 响应: {}", e)))?;

    let raw_stages = raw.stages.ok_or_else(|| invalid("响应缺少 stages"))?;
    if !(3..=5).contains(&raw_stages.len()) {
        return Err(invalid(format!(
            "学习阶段数量必须为 3-5，实际 {}",
            raw_stages.len()
        )));
    }

    let mut stages = Vec::with_capacity(raw_stages.len());
    for stage in raw_stages {
        let id = non_empty(stage.id, "id")?;
        let title = non_empty(stage.title, "title")?;
        let content = stage.content.ok_or_else(|| invalid("阶段缺少 content"))?;
        if !(3..=5).contains(&content.len()) {
            return Err(invalid(format!("阶段 {} 的内容必须为 3-5 条", id)));
        }
        let video_links = stage
            .video_links
            .ok_or_else(|| invalid("阶段缺少 videoLinks"))?;
        let duration = non_empty(stage.duration, "duration")?;

        stages.push(PathStage {
            id,
            title,
            content,
            video_links,
            duration,
        });
    }

    Ok(LearningPath {
        stages,
        estimated_duration: String::new(),
        target_score: 0.0,
    })
}
