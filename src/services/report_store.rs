//! 报告历史存储
//!
//! 所有报告保存在一个 JSON 文件中，最新的在前，超过上限时丢弃最旧的。

use crate::error::{AppResult, PipelineError};
use crate::models::{ReportData, ReportStatistics, StoredReport};
use crate::services::ReportStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

/// 默认最多保存的报告数
pub const DEFAULT_MAX_REPORTS: usize = 50;

/// 基于 JSON 文件的报告存储
pub struct FileReportStore {
    path: PathBuf,
    max_reports: usize,
    // 读-改-写期间持有
    lock: Mutex<()>,
}

impl FileReportStore {
    pub fn new(path: impl Into<PathBuf>, max_reports: usize) -> Self {
        Self {
            path: path.into(),
            max_reports: max_reports.max(1),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 按 ID 获取报告
    pub async fn get_report(&self, id: &str) -> AppResult<Option<StoredReport>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.into_iter().find(|r| r.id == id))
    }

    /// 删除报告，返回是否存在
    pub async fn delete_report(&self, id: &str) -> AppResult<bool> {
        let _guard = self.lock.lock().await;
        let mut reports = self.read_all().await?;
        let before = reports.len();
        reports.retain(|r| r.id != id);

        if reports.len() == before {
            return Ok(false);
        }
        self.write_all(&reports).await?;
        info!("报告已删除: {}", id);
        Ok(true)
    }

    /// 清空所有报告
    pub async fn clear(&self) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.storage_error(e)),
        }
    }

    /// 历史报告统计
    pub async fn statistics(&self) -> AppResult<ReportStatistics> {
        let reports = self.load_reports().await?;
        if reports.is_empty() {
            return Ok(ReportStatistics::default());
        }

        let count = reports.len() as f64;
        let scores = reports.iter().map(|r| r.score);

        Ok(ReportStatistics {
            total_reports: reports.len(),
            average_score: reports.iter().map(|r| r.score).sum::<f64>() / count,
            highest_score: scores.clone().fold(f64::MIN, f64::max),
            lowest_score: scores.fold(f64::MAX, f64::min),
            average_accuracy: reports.iter().map(|r| r.accuracy).sum::<f64>() / count,
        })
    }

    async fn read_all(&self) -> AppResult<Vec<StoredReport>> {
        match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| self.storage_error(e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.storage_error(e)),
        }
    }

    async fn write_all(&self, reports: &[StoredReport]) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.storage_error(e))?;
        }

        let bytes = serde_json::to_vec_pretty(reports).map_err(|e| self.storage_error(e))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| self.storage_error(e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.storage_error(e))
    }

    fn storage_error(&self, err: impl std::fmt::Display) -> PipelineError {
        PipelineError::storage(self.path.display().to_string(), err)
    }
}

#[async_trait]
impl ReportStore for FileReportStore {
    async fn save_report(&self, report: &ReportData) -> AppResult<()> {
        let _guard = self.lock.lock().await;

        let mut reports = self.read_all().await?;
        reports.insert(0, StoredReport::from(report.clone()));
        reports.truncate(self.max_reports);

        self.write_all(&reports).await?;
        info!("报告已保存: {}", report.id);
        Ok(())
    }

    async fn load_reports(&self) -> AppResult<Vec<StoredReport>> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }
}
