use serde::{Deserialize, Serialize};
use std::fmt;

/// 预测标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "CHURN")]
    Churn,
    #[serde(rename = "NO_CHURN")]
    NoChurn,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Churn => "CHURN",
            Label::NoChurn => "NO_CHURN",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条解释（特征 + 原因）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub feature: String,
    pub reason: String,
}

/// 评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    /// 流失概率，范围 [0, 1]
    pub score: f64,
    #[serde(default)]
    pub explanation: Vec<Explanation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<u32>,
}

impl Prediction {
    pub fn new(label: Label, score: f64) -> Self {
        Self {
            label,
            score,
            explanation: Vec::new(),
            demo: None,
            votes: None,
        }
    }

    /// 风险百分比（四舍五入）
    pub fn risk_pct(&self) -> i64 {
        (self.score * 100.0).round() as i64
    }

    /// 对话中展示的摘要，例如 `Prediction: CHURN (62% risk)`
    pub fn summary(&self) -> String {
        format!("Prediction: {} ({}% risk)", self.label, self.risk_pct())
    }
}
