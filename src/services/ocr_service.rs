//! HTTP OCR 服务
//!
//! `POST {base_url}/ocr`，请求体 `{"imageBase64": "..."}`，
//! 响应 `{"success": bool, "data": {"rawText": "...", "confidence": 0.95}, "error": "..."}`。

use crate::error::{AppResult, PipelineError};
use crate::models::OcrResult;
use crate::services::Recognizer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const SERVICE: &str = "ocr";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OcrRequest<'a> {
    image_base64: &'a str,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    success: bool,
    #[serde(default)]
    data: Option<OcrData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OcrData {
    #[serde(default)]
    raw_text: String,
    #[serde(default)]
    confidence: f64,
}

/// OCR 客户端
pub struct HttpOcrService {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpOcrService {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::external(SERVICE, e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/ocr", self.base_url)
    }
}

/// 解析 OCR 服务响应
pub fn parse_ocr_response(body: &str) -> AppResult<OcrResult> {
    let response: OcrResponse =
        serde_json::from_str(body).map_err(|e| PipelineError::external(SERVICE, format!("响应格式错误: {}", e)))?;

    if !response.success {
        let message = response.error.unwrap_or_else(|| "未知错误".to_string());
        return Err(PipelineError::external(SERVICE, message));
    }

    let data = response
        .data
        .ok_or_else(|| PipelineError::external(SERVICE, "响应缺少 data 字段"))?;

    Ok(OcrResult {
        text: data.raw_text,
        confidence: data.confidence,
    })
}

#[async_trait]
impl Recognizer for HttpOcrService {
    async fn recognize(&self, image_base64: &str) -> AppResult<OcrResult> {
        debug!("[OCR] 发送识别请求，图像大小: {} 字符", image_base64.len());

        let mut request = self
            .client
            .post(self.endpoint())
            .json(&OcrRequest { image_base64 });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("[OCR] 服务返回错误状态: {}", status);
            return Err(PipelineError::external(
                SERVICE,
                format!("HTTP {}: {}", status, crate::utils::truncate_text(&body, 200)),
            ));
        }

        let result = parse_ocr_response(&body)?;
        debug!(
            "[OCR] 识别完成，文本长度: {}, 置信度: {:.2}",
            result.text.len(),
            result.confidence
        );
        Ok(result)
    }
}
