use crate::models::answer::AnswerSet;
use crate::models::input::BatchInput;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 支持的图像扩展名
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 从 TOML 文件加载标准答案集并校验
pub async fn load_answer_set(toml_file_path: &Path) -> Result<AnswerSet> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let answer_set: AnswerSet = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    let errors = answer_set.validate();
    if !errors.is_empty() {
        anyhow::bail!(
            "答案集校验失败 ({}): {}",
            toml_file_path.display(),
            errors.join("; ")
        );
    }

    tracing::info!(
        "成功加载答案集 {} ({} 题)",
        answer_set.name,
        answer_set.answers.len()
    );

    Ok(answer_set)
}

/// 从文件夹中加载所有答题卡图像，按文件名排序
pub async fn load_batch_inputs(folder_path: &str) -> Result<Vec<BatchInput>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut image_paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_image(&path) {
            image_paths.push(path);
        }
    }

    image_paths.sort();

    let batch_ts = chrono::Local::now().timestamp_millis();
    let mut inputs = Vec::with_capacity(image_paths.len());

    for (index, path) in image_paths.iter().enumerate() {
        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        match fs::read(path).await {
            Ok(payload) => {
                tracing::info!("正在加载: {} ({} 字节)", file_name, payload.len());
                inputs.push(BatchInput::new(
                    format!("batch-{}-{}", batch_ts, index),
                    file_name,
                    payload,
                ));
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(inputs)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
