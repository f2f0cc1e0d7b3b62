//! 演示评分 - 业务能力层
//!
//! 后端不可用或开启演示模式时使用的确定性规则评分，返回结构与后端一致。

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{AnswerSet, Explanation, Label, Prediction};
use crate::services::scorer::Scorer;

/// 基础分
const BASE_SCORE: f64 = 0.3;

/// 规则评分器
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoScorer;

impl DemoScorer {
    pub fn new() -> Self {
        Self
    }

    /// 同步计算预测结果
    pub fn predict(&self, answers: &AnswerSet) -> Prediction {
        let mut score = BASE_SCORE;
        let mut explanation = Vec::new();
        let mut explain = |feature: &str, reason: &str| {
            explanation.push(Explanation {
                feature: feature.to_string(),
                reason: reason.to_string(),
            });
        };

        if answers.contract == "Month-to-month" {
            score += 0.2;
            explain("contract", "Month-to-month increases churn risk");
        }

        if answers.payment_delay >= 10 {
            score += (0.05 + (answers.payment_delay - 10) as f64 * 0.005).min(0.15);
            explain("paymentDelay", "Payment delays signal risk");
        }

        if answers.tenure <= 6 {
            score += 0.1;
            explain("tenure", "Low tenure suggests weak retention");
        }

        if answers.internet_service == "Fiber optic" {
            score += 0.05;
            explain("internetService", "Fiber optic segment may have higher churn");
        }

        let score = score.clamp(0.0, 1.0);
        let label = if score >= 0.5 { Label::Churn } else { Label::NoChurn };

        Prediction {
            label,
            score,
            explanation,
            demo: Some(true),
            votes: Some((score * 100.0).round() as u32),
        }
    }
}

#[async_trait]
impl Scorer for DemoScorer {
    async fn score(&self, answers: &AnswerSet) -> AppResult<Prediction> {
        Ok(self.predict(answers))
    }
}
