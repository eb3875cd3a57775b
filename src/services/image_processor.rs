//! 图像预处理
//!
//! 只做输入校验和 base64 编码，不做真正的压缩。

use crate::error::{AppResult, PipelineError};
use crate::models::Stage;
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// 图像大小限制
#[derive(Debug, Clone, Copy)]
pub struct ImageLimits {
    pub max_bytes: usize,
}

impl Default for ImageLimits {
    fn default() -> Self {
        // 2 MiB
        Self {
            max_bytes: 2 * 1024 * 1024,
        }
    }
}

/// 校验图像并编码为 base64
pub fn prepare_image(payload: &[u8], limits: ImageLimits) -> AppResult<String> {
    if payload.is_empty() {
        return Err(PipelineError::validation(Stage::Compress, "图像内容为空"));
    }
    if payload.len() > limits.max_bytes {
        return Err(PipelineError::validation(
            Stage::Compress,
            format!(
                "图像过大: {} 字节，上限 {} 字节",
                payload.len(),
                limits.max_bytes
            ),
        ));
    }

    Ok(STANDARD.encode(payload))
}
