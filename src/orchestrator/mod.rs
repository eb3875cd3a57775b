//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和并发调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行）
//! - 组装缓存、请求队列和外部协作方
//! - 扫描输入目录，输出全局统计信息
//!
//! ### `batch_processor` - 批量条目处理器
//! - 每张答题卡作为一个调度任务
//! - 控制并发数量（TaskScheduler）
//! - 转发进度事件，汇总成绩概况
//!
//! ## 层次关系
//!
//! ```text
//! app (组装依赖)
//!     ↓
//! batch_processor (处理 Vec<BatchInput>)
//!     ↓
//! workflow::ItemFlow (处理单个条目)
//!     ↓
//! services (能力层：ocr / grade / llm / report)
//!     ↓
//! infrastructure (基础设施：cache / queue / scheduler)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：app 管组装，batch_processor 管批量
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod app;
pub mod batch_processor;

// 重新导出主要类型
pub use crate::workflow::BatchEvent;
pub use app::App;
pub use batch_processor::{BatchOptions, BatchProcessor, BatchReport, BatchSummary, ItemError};
