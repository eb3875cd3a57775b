use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::infrastructure::{CacheConfig, QueueConfig};
use crate::services::ImageLimits;

/// 程序配置文件
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时处理的条目数量
    pub max_concurrent_items: usize,
    /// 同时进行的外部请求数量
    pub queue_max_concurrent: usize,
    /// 单个外部请求超时（秒）
    pub request_timeout_secs: u64,
    /// 超时后是否中止请求
    pub abort_on_timeout: bool,
    // --- 缓存配置 ---
    pub cache_dir: String,
    pub cache_max_size_mb: u64,
    pub cache_max_age_days: u64,
    pub cache_max_items: usize,
    // --- 输入输出 ---
    /// 答题卡图像目录
    pub input_folder: String,
    /// 标准答案集 TOML 文件，未设置时使用示例答案集
    pub answer_set_file: Option<String>,
    /// 单张图像最大字节数
    pub max_image_bytes: usize,
    /// 报告历史文件
    pub report_file: String,
    pub max_reports: usize,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 使用模拟服务，不访问网络
    pub mock_mode: bool,
    // --- OCR 配置 ---
    pub ocr_api_base_url: String,
    pub ocr_api_key: Option<String>,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_items: 3,
            queue_max_concurrent: 2,
            request_timeout_secs: 30,
            abort_on_timeout: false,
            cache_dir: "cache".to_string(),
            cache_max_size_mb: 50,
            cache_max_age_days: 7,
            cache_max_items: 100,
            input_folder: "input_images".to_string(),
            answer_set_file: None,
            max_image_bytes: ImageLimits::default().max_bytes,
            report_file: "reports/reports.json".to_string(),
            max_reports: 50,
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            mock_mode: true,
            ocr_api_base_url: "http://localhost:3000/api".to_string(),
            ocr_api_key: None,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.deepseek.com/v1".to_string(),
            llm_model_name: "deepseek-chat".to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str, default: Option<String>) -> Option<String> {
    std::env::var(key).ok().or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_items: env_or("MAX_CONCURRENT_ITEMS", default.max_concurrent_items),
            queue_max_concurrent: env_or("QUEUE_MAX_CONCURRENT", default.queue_max_concurrent),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", default.request_timeout_secs),
            abort_on_timeout: env_or("ABORT_ON_TIMEOUT", default.abort_on_timeout),
            cache_dir: env_or("CACHE_DIR", default.cache_dir),
            cache_max_size_mb: env_or("CACHE_MAX_SIZE_MB", default.cache_max_size_mb),
            cache_max_age_days: env_or("CACHE_MAX_AGE_DAYS", default.cache_max_age_days),
            cache_max_items: env_or("CACHE_MAX_ITEMS", default.cache_max_items),
            input_folder: env_or("INPUT_FOLDER", default.input_folder),
            answer_set_file: env_opt("ANSWER_SET_FILE", default.answer_set_file),
            max_image_bytes: env_or("MAX_IMAGE_BYTES", default.max_image_bytes),
            report_file: env_or("REPORT_FILE", default.report_file),
            max_reports: env_or("MAX_REPORTS", default.max_reports),
            output_log_file: env_or("OUTPUT_LOG_FILE", default.output_log_file),
            verbose_logging: env_or("VERBOSE_LOGGING", default.verbose_logging),
            mock_mode: env_or("MOCK_MODE", default.mock_mode),
            ocr_api_base_url: env_or("OCR_API_BASE_URL", default.ocr_api_base_url),
            ocr_api_key: env_opt("OCR_API_KEY", default.ocr_api_key),
            llm_api_key: env_or("LLM_API_KEY", default.llm_api_key),
            llm_api_base_url: env_or("LLM_API_BASE_URL", default.llm_api_base_url),
            llm_model_name: env_or("LLM_MODEL_NAME", default.llm_model_name),
        }
    }

    /// 从 TOML 文件加载，缺少的字段使用默认值
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("无法解析配置文件: {}", path.display()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_size: self.cache_max_size_mb * 1024 * 1024,
            max_age: Duration::from_secs(self.cache_max_age_days * 24 * 60 * 60),
            max_items: self.cache_max_items,
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_concurrent: self.queue_max_concurrent,
            timeout: self.request_timeout(),
            abort_on_timeout: self.abort_on_timeout,
        }
    }

    pub fn image_limits(&self) -> ImageLimits {
        ImageLimits {
            max_bytes: self.max_image_bytes,
        }
    }
}
