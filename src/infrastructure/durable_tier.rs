//! 缓存持久层
//!
//! 持久层是缓存的事实来源，内存层只是读穿加速。
//! 每个键对应一个 JSON 文件，写入先落临时文件再 rename，单键写入是原子的。

use crate::error::{AppResult, PipelineError};
use crate::infrastructure::tiered_cache::CacheEntry;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, warn};

/// 十六进制编码后超过该长度的键改用摘要命名，文件名保持在 255 字节以内
const MAX_ENCODED_KEY_LEN: usize = 128;

/// 缓存持久层抽象
#[async_trait]
pub trait DurableTier: Send + Sync {
    /// 读取单个条目，不存在时返回 `None`
    async fn load(&self, key: &str) -> AppResult<Option<CacheEntry>>;

    /// 写入（覆盖）单个条目
    async fn store(&self, entry: &CacheEntry) -> AppResult<()>;

    /// 删除单个条目，不存在视为成功
    async fn remove(&self, key: &str) -> AppResult<()>;

    /// 列出全部条目（用于清理和统计）
    async fn entries(&self) -> AppResult<Vec<CacheEntry>>;

    /// 删除全部条目，返回删除数量
    async fn clear(&self) -> AppResult<usize>;
}

/// 基于目录的持久层
pub struct FileTier {
    dir: PathBuf,
    prefix: String,
    tmp_counter: AtomicU64,
}

impl FileTier {
    pub const DEFAULT_PREFIX: &'static str = "vision_cache_";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_prefix(dir, Self::DEFAULT_PREFIX)
    }

    pub fn with_prefix(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 短键使用十六进制编码，长键使用 SHA-256 摘要
    ///
    /// 摘要名带 `sha256-` 标记，与纯十六进制名不会重合。
    fn entry_path(&self, key: &str) -> PathBuf {
        let encoded = hex(key.as_bytes());
        let name = if encoded.len() > MAX_ENCODED_KEY_LEN {
            format!("sha256-{}", hex(&Sha256::digest(key.as_bytes())))
        } else {
            encoded
        };
        self.dir.join(format!("{}{}.json", self.prefix, name))
    }

    fn is_entry_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(&self.prefix) && n.ends_with(".json"))
            .unwrap_or(false)
    }

    async fn read_entry(path: &Path) -> AppResult<Option<CacheEntry>> {
        match fs::read(path).await {
            Ok(bytes) => {
                let entry = serde_json::from_slice(&bytes)
                    .map_err(|e| PipelineError::storage(path.display().to_string(), e))?;
                Ok(Some(entry))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::storage(path.display().to_string(), e)),
        }
    }
}

#[async_trait]
impl DurableTier for FileTier {
    async fn load(&self, key: &str) -> AppResult<Option<CacheEntry>> {
        match Self::read_entry(&self.entry_path(key)).await? {
            Some(entry) if entry.key != key => {
                debug!("[FileTier] 摘要冲突，按未命中处理: {}", key);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn store(&self, entry: &CacheEntry) -> AppResult<()> {
        let path = self.entry_path(&entry.key);
        let target = path.display().to_string();

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PipelineError::storage(self.dir.display().to_string(), e))?;

        let bytes = serde_json::to_vec(entry).map_err(|e| PipelineError::storage(&target, e))?;

        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("tmp-{}-{}", std::process::id(), seq));

        fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| PipelineError::storage(&target, e))?;

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(PipelineError::storage(&target, e));
        }

        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let path = self.entry_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::storage(path.display().to_string(), e)),
        }
    }

    async fn entries(&self) -> AppResult<Vec<CacheEntry>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PipelineError::storage(self.dir.display().to_string(), e)),
        };

        let mut entries = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| PipelineError::storage(self.dir.display().to_string(), e))?
        {
            let path = item.path();
            if !self.is_entry_file(&path) {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some(entry)) => entries.push(entry),
                // 列目录后被并发删除
                Ok(None) => {}
                Err(e) => warn!("[FileTier] 跳过损坏的缓存文件: {}", e),
            }
        }

        Ok(entries)
    }

    async fn clear(&self) -> AppResult<usize> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(PipelineError::storage(self.dir.display().to_string(), e)),
        };

        let mut removed = 0;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if self.is_entry_file(&path) {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(PipelineError::storage(path.display().to_string(), e)),
                }
            }
        }

        Ok(removed)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
