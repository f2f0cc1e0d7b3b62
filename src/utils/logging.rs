/// 日志工具模块
///
/// 提供日志初始化和启动信息输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化日志
///
/// 优先使用 `RUST_LOG`；未设置时默认 `info`，开启详细日志时为 `debug`。
/// 日志写到 stderr，stdout 留给对话输出。
///
/// # 参数
/// - `verbose`: 是否显示详细日志
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 重复初始化（例如测试中）时忽略错误
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 程序配置
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    match &config.batch_csv_path {
        Some(path) => {
            info!("🚀 程序启动 - 批量评分模式");
            info!("📄 输入文件: {}", path);
            info!("📊 最大并发数: {}", config.batch_concurrency);
        }
        None => {
            info!("🚀 程序启动 - 对话模式");
            info!("💾 会话目录: {}", config.storage_dir);
        }
    }
    info!("🌐 评分后端: {}", config.api_base_url);
    if config.demo_mode {
        info!("🧪 演示模式已开启");
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
