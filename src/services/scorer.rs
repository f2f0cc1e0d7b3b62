//! 评分能力接口 - 业务能力层
//!
//! 对话流程、批量评分和 what-if 重算都只依赖这里的 trait，
//! 具体实现（HTTP / 演示评分 / 测试替身）可以自由替换。

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{AnswerSet, Prediction};

/// 评分器：把一组完整答案映射为预测结果
///
/// 传输失败或后端拒绝时返回 [`crate::error::TransportError`]。
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, answers: &AnswerSet) -> AppResult<Prediction>;
}

/// 健康检查：只作为“在线评分 / 兜底评分”的开关使用
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> bool;
}
