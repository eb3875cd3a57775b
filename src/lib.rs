//! # Answer Sheet Pipeline
//!
//! 答题卡批量分析流水线：识别 → 评分 → 错误分析 → 学习路径 → 报告
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 与业务无关的通用能力
//! - `TieredCache` - 内存 + 持久化两级缓存
//! - `RequestQueue` - 优先级请求队列（并发上限 + 超时）
//! - `TaskScheduler` - 有界并发任务调度
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单张答题卡
//! - `Recognizer` / `ErrorAnalyzer` / `PathGenerator` / `ReportStore` - 外部协作方
//! - `extract_answers` / `grade` / `build_report` - 纯计算
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一张答题卡"的完整处理流程
//! - `ItemCtx` - 上下文封装（item_id + slot）
//! - `ItemFlow` - 流程编排（压缩 → 识别 → 提取 → 评分 → 分析 → 规划 → 保存）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 应用入口，组装依赖
//! - `orchestrator/batch_processor` - 批量处理器，管理并发和统计
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppResult, ErrorKind, PipelineError};
pub use infrastructure::{
    RequestPriority, RequestQueue, RunStatistics, Task, TaskScheduler, TieredCache,
};
pub use models::{BatchInput, ItemStatus, PipelineItem, Stage};
pub use orchestrator::{App, BatchEvent, BatchOptions, BatchProcessor, BatchReport};
pub use workflow::{Collaborators, ItemCtx, ItemFlow};
