//! HTTP 评分服务 - 业务能力层
//!
//! 调用后端 `POST /api/predict` 与 `GET /api/health`。

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, TransportError};
use crate::models::{AnswerSet, Prediction};
use crate::services::scorer::{HealthCheck, Scorer};

/// 后端错误响应体
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP 评分客户端
#[derive(Clone)]
pub struct HttpScorer {
    client: Client,
    base_url: String,
}

impl HttpScorer {
    /// 创建新的 HTTP 评分客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Other(format!("无法创建 HTTP 客户端: {}", e)))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(&config.api_base_url),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(&self, answers: &AnswerSet) -> AppResult<Prediction> {
        let url = self.endpoint("/api/predict");
        debug!("POST {} {:?}", url, answers);

        let response = self
            .client
            .post(&url)
            .json(answers)
            .send()
            .await
            .map_err(|e| {
                warn!("评分请求失败: {}", e);
                AppError::unreachable(&url, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message);
            warn!("评分接口返回 {}: {:?}", status, message);
            return Err(AppError::bad_response(&url, status.as_u16(), message));
        }

        response.json::<Prediction>().await.map_err(|e| {
            AppError::Transport(TransportError::Decode {
                endpoint: url,
                source: Box::new(e),
            })
        })
    }
}

#[async_trait]
impl HealthCheck for HttpScorer {
    async fn check(&self) -> bool {
        let url = self.endpoint("/api/health");
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!("健康检查失败: {}", response.status());
                false
            }
            Err(e) => {
                debug!("健康检查无法连接: {}", e);
                false
            }
        }
    }
}

/// 去掉结尾的 `/`，缺少协议时补 `https://`
fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
