use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入校验错误（可在原地重试，不会向上传播为致命错误）
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 评分服务 / 健康检查调用错误
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// 持久化存储错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 单个字段的校验错误
///
/// `Display` 输出即为展示给用户的提示文案。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// 未知字段
    #[error("Unknown field.")]
    UnknownField { field: String },
    /// 必填字段为空
    #[error("This field is required.")]
    Required,
    /// 无法解析为数字
    #[error("Please enter a valid number.")]
    NotANumber,
    /// 小于下限
    #[error("Must be at least {min}.")]
    BelowMin { min: f64 },
    /// 大于上限
    #[error("Must be at most {max}.")]
    AboveMax { max: f64 },
    /// 不在可选项中
    #[error("Please choose one of the options.")]
    NotAnOption,
}

/// 评分服务调用错误
#[derive(Debug, Error)]
pub enum TransportError {
    /// 无法连接后端
    #[error("I couldn't reach the backend. Please try again.")]
    Unreachable {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 后端返回非成功响应
    #[error("{}", bad_response_message(.status, .message))]
    BadResponse {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },
    /// 响应体解析失败
    #[error("Unexpected response from the backend.")]
    Decode {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 评分器自身给出的失败信息（测试替身 / 兜底评分器使用）
    #[error("{0}")]
    Rejected(String),
}

/// 存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 读取失败
    #[error("读取 {key} 失败: {source}")]
    ReadFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入失败
    #[error("写入 {key} 失败: {source}")]
    WriteFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 删除失败
    #[error("删除 {key} 失败: {source}")]
    RemoveFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 序列化失败
    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件解析失败
    #[error("配置文件 {path} 解析失败: {source}")]
    FileParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

fn bad_response_message(status: &u16, message: &Option<String>) -> String {
    match message {
        Some(message) if !message.is_empty() => message.clone(),
        _ => format!("Request failed: {status}"),
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建“无法连接后端”错误
    pub fn unreachable(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Transport(TransportError::Unreachable {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建“后端返回错误响应”错误
    pub fn bad_response(endpoint: impl Into<String>, status: u16, message: Option<String>) -> Self {
        AppError::Transport(TransportError::BadResponse {
            endpoint: endpoint.into(),
            status,
            message,
        })
    }

    /// 创建评分器拒绝错误
    pub fn rejected(message: impl Into<String>) -> Self {
        AppError::Transport(TransportError::Rejected(message.into()))
    }

    /// 展示给用户的错误文案
    ///
    /// 校验错误与传输错误直接使用其 `Display`，不带分类前缀。
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(e) => e.to_string(),
            AppError::Transport(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
