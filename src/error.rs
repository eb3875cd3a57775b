use std::time::Duration;
use thiserror::Error;

use crate::models::Stage;

/// 流水线错误类型
///
/// 缓存层的存储错误在缓存边界内被吞掉（降级为未命中），
/// 其余错误都会传播到所属条目，记录为该条目的终止错误状态。
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// 阶段输入缺失或格式错误
    #[error("输入校验失败 ({stage}): {message}")]
    Validation { stage: Stage, message: String },

    /// 请求超过队列配置的超时时间
    #[error("请求超时 ({request}): 超过 {}ms 未完成", .timeout.as_millis())]
    Timeout { request: String, timeout: Duration },

    /// 外部服务（OCR / 分析 / 学习路径）返回失败
    #[error("外部服务错误 ({service}): {message}")]
    ExternalService { service: String, message: String },

    /// 缓存或报告存储读写失败
    #[error("存储错误 ({target}): {message}")]
    Storage { target: String, message: String },

    /// 等待中的请求在开始执行前被取消
    #[error("请求已取消: {request}")]
    Cancelled { request: String },

    /// 工作单元执行时 panic
    #[error("任务 {task} 异常终止: {message}")]
    TaskPanicked { task: String, message: String },
}

/// 错误分类，便于统计和断言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Timeout,
    ExternalService,
    Storage,
    Cancelled,
    TaskPanicked,
}

impl PipelineError {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation { .. } => ErrorKind::Validation,
            PipelineError::Timeout { .. } => ErrorKind::Timeout,
            PipelineError::ExternalService { .. } => ErrorKind::ExternalService,
            PipelineError::Storage { .. } => ErrorKind::Storage,
            PipelineError::Cancelled { .. } => ErrorKind::Cancelled,
            PipelineError::TaskPanicked { .. } => ErrorKind::TaskPanicked,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

// ========== 从常见错误类型转换 ==========

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Storage {
            target: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::ExternalService {
            service: "json".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        let service = err
            .url()
            .map(|url| url.path().to_string())
            .unwrap_or_else(|| "http".to_string());
        PipelineError::ExternalService {
            service,
            message: err.to_string(),
        }
    }
}

// ========== 便捷构造函数 ==========

impl PipelineError {
    /// 创建输入校验错误
    pub fn validation(stage: Stage, message: impl Into<String>) -> Self {
        PipelineError::Validation {
            stage,
            message: message.into(),
        }
    }

    /// 创建超时错误
    pub fn timeout(request: impl Into<String>, timeout: Duration) -> Self {
        PipelineError::Timeout {
            request: request.into(),
            timeout,
        }
    }

    /// 创建外部服务错误
    pub fn external(service: impl Into<String>, message: impl std::fmt::Display) -> Self {
        PipelineError::ExternalService {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// 创建存储错误
    pub fn storage(target: impl Into<String>, message: impl std::fmt::Display) -> Self {
        PipelineError::Storage {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// 创建取消错误
    pub fn cancelled(request: impl Into<String>) -> Self {
        PipelineError::Cancelled {
            request: request.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 流水线结果类型
pub type AppResult<T> = Result<T, PipelineError>;
