use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 评分后端地址
    pub api_base_url: String,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 批量评分的最大并发数
    pub batch_concurrency: usize,
    /// 强制使用演示评分
    pub demo_mode: bool,
    /// 会话存储目录
    pub storage_dir: String,
    /// 批量评分输入 CSV；设置后以批量模式运行
    pub batch_csv_path: Option<String>,
    /// 批量评分结果输出文件
    pub batch_output_path: String,
    /// 确认预测后的停顿（毫秒）
    pub predict_delay_ms: u64,
    /// 会话自动保存的防抖间隔（毫秒）
    pub autosave_debounce_ms: u64,
    /// what-if 重算的防抖间隔（毫秒）
    pub rescore_debounce_ms: u64,
    /// 后端健康检查的轮询间隔（秒）
    pub health_poll_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 15,
            batch_concurrency: 3,
            demo_mode: false,
            storage_dir: ".churn_sessions".to_string(),
            batch_csv_path: None,
            batch_output_path: "batch_results.csv".to_string(),
            predict_delay_ms: 500,
            autosave_debounce_ms: 500,
            rescore_debounce_ms: 400,
            health_poll_secs: 10,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 默认值 + 环境变量覆盖
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// 从 TOML 文件加载（文件不存在时使用默认值），再叠加环境变量
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let base: Self = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|source| ConfigError::FileParseFailed {
                path: path.display().to_string(),
                source,
            })?,
            Err(_) => return Ok(Self::from_env()),
        };
        Ok(base.with_env())
    }

    /// 用环境变量覆盖已有字段；无法解析的值保持原值
    pub fn with_env(self) -> Self {
        Self {
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(self.api_base_url),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(self.request_timeout_secs),
            batch_concurrency: env_parse("BATCH_CONCURRENCY").unwrap_or(self.batch_concurrency),
            demo_mode: env_parse("DEMO_MODE").unwrap_or(self.demo_mode),
            storage_dir: std::env::var("STORAGE_DIR").unwrap_or(self.storage_dir),
            batch_csv_path: std::env::var("BATCH_CSV").ok().or(self.batch_csv_path),
            batch_output_path: std::env::var("BATCH_OUTPUT").unwrap_or(self.batch_output_path),
            predict_delay_ms: env_parse("PREDICT_DELAY_MS").unwrap_or(self.predict_delay_ms),
            autosave_debounce_ms: env_parse("AUTOSAVE_DEBOUNCE_MS").unwrap_or(self.autosave_debounce_ms),
            rescore_debounce_ms: env_parse("RESCORE_DEBOUNCE_MS").unwrap_or(self.rescore_debounce_ms),
            health_poll_secs: env_parse("HEALTH_POLL_SECS").unwrap_or(self.health_poll_secs),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str) -> Option<T> {
    let value = std::env::var(var_name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            let err = ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            };
            tracing::warn!("{}，使用默认值", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            api_base_url = "https://churn.example.com"
            batch_concurrency = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.api_base_url, "https://churn.example.com");
        assert_eq!(config.batch_concurrency, 5);
        assert_eq!(config.predict_delay_ms, 500);
        assert_eq!(config.rescore_debounce_ms, 400);
        assert!(config.batch_csv_path.is_none());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load("definitely/not/here.toml").unwrap();
        assert!(config.batch_concurrency >= 1);
        assert_eq!(config.api_base_url, Config::from_env().api_base_url);
    }

    #[test]
    fn health_poll_defaults_to_ten_seconds() {
        assert_eq!(Config::default().health_poll_secs, 10);
        let config: Config = toml::from_str("health_poll_secs = 30").unwrap();
        assert_eq!(config.health_poll_secs, 30);
    }
}
