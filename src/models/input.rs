use std::fmt;

/// 一个待处理的答题卡输入
#[derive(Clone)]
pub struct BatchInput {
    pub id: String,
    pub file_name: String,
    /// 原始图像字节
    pub payload: Vec<u8>,
}

impl BatchInput {
    pub fn new(id: impl Into<String>, file_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            payload,
        }
    }
}

// 不打印图像字节
impl fmt::Debug for BatchInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchInput")
            .field("id", &self.id)
            .field("file_name", &self.file_name)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
