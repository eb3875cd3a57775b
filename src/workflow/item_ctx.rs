//! 条目处理上下文
//!
//! 封装"我正在处理批次中的第几张答题卡"这一信息

use std::fmt::Display;

/// 条目处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 条目 ID
    pub item_id: String,

    /// 条目在批次中的位置（从 0 开始，用于更新状态）
    pub slot: usize,

    /// 文件名（仅用于日志显示）
    pub file_name: String,
}

impl ItemCtx {
    pub fn new(item_id: impl Into<String>, slot: usize, file_name: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            slot,
            file_name: file_name.into(),
        }
    }

    /// 日志中显示的编号（从 1 开始）
    pub fn display_index(&self) -> usize {
        self.slot + 1
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[条目 {} {}]", self.display_index(), self.file_name)
    }
}
