use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ValidationError;
use crate::models::step::{revalidate, StepKey, STEPS};

/// 单个已校验的答案值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Integer(i64),
    Decimal(f64),
    Choice(String),
}

impl AnswerValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AnswerValue::Integer(n) => Some(*n as f64),
            AnswerValue::Decimal(n) => Some(*n),
            AnswerValue::Choice(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnswerValue::Choice(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Integer(n) => write!(f, "{}", n),
            AnswerValue::Decimal(n) => write!(f, "{}", n),
            AnswerValue::Choice(s) => f.write_str(s),
        }
    }
}

/// 已收集的答案（可能不完整）
pub type Answers = BTreeMap<StepKey, AnswerValue>;

/// 第一个尚未回答的步骤位置；全部回答时返回步骤总数
pub fn first_unanswered(answers: &Answers) -> usize {
    STEPS
        .iter()
        .position(|k| !answers.contains_key(k))
        .unwrap_or(STEPS.len())
}

/// 完整的评分请求体
///
/// 只能由六个全部通过校验的答案构造。按值比较（`PartialEq`）用于 what-if 去重。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSet {
    pub age: i64,
    pub tenure: i64,
    pub monthly_charges: f64,
    pub contract: String,
    pub internet_service: String,
    pub payment_delay: i64,
}

impl AnswerSet {
    /// 从答案表构造请求体，逐字段重新校验
    ///
    /// 返回第一个失败的字段及其错误。
    pub fn from_answers(answers: &Answers) -> Result<Self, (StepKey, ValidationError)> {
        let mut checked = Answers::new();
        for step in STEPS {
            let value = answers
                .get(&step)
                .ok_or((step, ValidationError::Required))?;
            let value = revalidate(step, value).map_err(|e| (step, e))?;
            checked.insert(step, value);
        }

        let int = |k: StepKey| checked.get(&k).and_then(AnswerValue::as_f64).unwrap_or_default() as i64;
        let num = |k: StepKey| checked.get(&k).and_then(AnswerValue::as_f64).unwrap_or_default();
        let text = |k: StepKey| {
            checked
                .get(&k)
                .and_then(AnswerValue::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            age: int(StepKey::Age),
            tenure: int(StepKey::Tenure),
            monthly_charges: num(StepKey::MonthlyCharges),
            contract: text(StepKey::Contract),
            internet_service: text(StepKey::InternetService),
            payment_delay: int(StepKey::PaymentDelay),
        })
    }

    /// 还原为答案表（what-if 基线）
    pub fn to_answers(&self) -> Answers {
        Answers::from([
            (StepKey::Age, AnswerValue::Integer(self.age)),
            (StepKey::Tenure, AnswerValue::Integer(self.tenure)),
            (StepKey::MonthlyCharges, AnswerValue::Decimal(self.monthly_charges)),
            (StepKey::Contract, AnswerValue::Choice(self.contract.clone())),
            (
                StepKey::InternetService,
                AnswerValue::Choice(self.internet_service.clone()),
            ),
            (StepKey::PaymentDelay, AnswerValue::Integer(self.payment_delay)),
        ])
    }
}
