use anyhow::Result;
use answer_sheet_pipeline::utils::logging::init_tracing;
use answer_sheet_pipeline::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置：命令行指定 TOML 文件，否则读取环境变量
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    // 初始化日志
    init_tracing(config.verbose_logging);

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
