//! 问题步骤定义与校验规则
//!
//! 六个固定步骤按顺序提问。校验规则在对话流程、批量评分和 what-if 重算之间共享，
//! 任何入口都只能通过 [`validate_answer`] 得到合法的 [`AnswerValue`]。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::models::answer::AnswerValue;

/// 步骤键（固定顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKey {
    Age,
    Tenure,
    MonthlyCharges,
    Contract,
    InternetService,
    PaymentDelay,
}

/// 全部步骤，顺序即提问顺序
pub const STEPS: [StepKey; 6] = [
    StepKey::Age,
    StepKey::Tenure,
    StepKey::MonthlyCharges,
    StepKey::Contract,
    StepKey::InternetService,
    StepKey::PaymentDelay,
];

/// 步骤总数
pub const STEP_COUNT: usize = STEPS.len();

/// 合同类型可选项
pub const CONTRACT_OPTIONS: &[&str] = &["Month-to-month", "One year", "Two year"];

/// 网络服务可选项
pub const INTERNET_SERVICE_OPTIONS: &[&str] = &["DSL", "Fiber optic", "None"];

/// 字段类型与约束
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// 数值字段，归一化为整数
    Integer { min: f64, max: f64 },
    /// 数值字段，保留两位小数
    Decimal { min: f64, max: f64 },
    /// 枚举字段
    Choice { options: &'static [&'static str] },
}

/// 单个步骤的配置
#[derive(Debug, Clone, Copy)]
pub struct StepConfig {
    pub key: StepKey,
    /// 提问文案
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl StepKey {
    /// JSON / CSV 中使用的字段名
    pub fn as_str(self) -> &'static str {
        match self {
            StepKey::Age => "age",
            StepKey::Tenure => "tenure",
            StepKey::MonthlyCharges => "monthlyCharges",
            StepKey::Contract => "contract",
            StepKey::InternetService => "internetService",
            StepKey::PaymentDelay => "paymentDelay",
        }
    }

    /// 简短标签，例如 `Monthly Charges`
    pub fn short_label(self) -> &'static str {
        match self {
            StepKey::Age => "Age",
            StepKey::Tenure => "Tenure",
            StepKey::MonthlyCharges => "Monthly Charges",
            StepKey::Contract => "Contract",
            StepKey::InternetService => "Internet Service",
            StepKey::PaymentDelay => "Payment Delay",
        }
    }

    /// 在 [`STEPS`] 中的位置
    pub fn index(self) -> usize {
        STEPS
            .iter()
            .position(|k| *k == self)
            .unwrap_or(STEP_COUNT)
    }

    /// 按位置取步骤
    pub fn at(index: usize) -> Option<Self> {
        STEPS.get(index).copied()
    }

    /// 下一个步骤；最后一步返回 `None`
    pub fn next(self) -> Option<Self> {
        Self::at(self.index() + 1)
    }

    pub fn is_last(self) -> bool {
        self == STEPS[STEP_COUNT - 1]
    }

    /// 步骤配置
    pub fn config(self) -> StepConfig {
        let (label, kind) = match self {
            StepKey::Age => (
                "What is the customer's age?",
                FieldKind::Integer { min: 0.0, max: 120.0 },
            ),
            StepKey::Tenure => (
                "How many months has the customer been with us?",
                FieldKind::Integer { min: 0.0, max: 120.0 },
            ),
            StepKey::MonthlyCharges => (
                "What are the monthly charges?",
                FieldKind::Decimal { min: 0.0, max: 1000.0 },
            ),
            StepKey::Contract => (
                "What is the contract type?",
                FieldKind::Choice { options: CONTRACT_OPTIONS },
            ),
            StepKey::InternetService => (
                "What internet service do they have?",
                FieldKind::Choice { options: INTERNET_SERVICE_OPTIONS },
            ),
            StepKey::PaymentDelay => (
                "How many days of payment delay (if any)?",
                FieldKind::Integer { min: 0.0, max: 60.0 },
            ),
        };
        StepConfig {
            key: self,
            label,
            kind,
            required: true,
        }
    }

    /// 提问文案
    pub fn question(self) -> &'static str {
        self.config().label
    }

    /// 枚举字段的可选项；数值字段为空
    pub fn options(self) -> &'static [&'static str] {
        match self.config().kind {
            FieldKind::Choice { options } => options,
            _ => &[],
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        STEPS
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownField {
                field: s.to_string(),
            })
    }
}

/// 归一化 + 校验原始输入
///
/// 规则：必填检查 → 数值解析 → 取整（`monthlyCharges` 保留两位小数）→ 范围检查；
/// 枚举字段去除首尾空白后必须精确匹配某个选项。
pub fn validate_answer(step: StepKey, raw: &str) -> Result<AnswerValue, ValidationError> {
    let config = step.config();
    let trimmed = raw.trim();

    if config.required && trimmed.is_empty() {
        return Err(ValidationError::Required);
    }

    match config.kind {
        FieldKind::Integer { min, max } => {
            let n = round_half_up(parse_number(trimmed)?);
            check_range(n, min, max)?;
            Ok(AnswerValue::Integer(n as i64))
        }
        FieldKind::Decimal { min, max } => {
            let n = round_to_cents(parse_number(trimmed)?);
            check_range(n, min, max)?;
            Ok(AnswerValue::Decimal(n))
        }
        FieldKind::Choice { options } => options
            .iter()
            .find(|opt| **opt == trimmed)
            .map(|opt| AnswerValue::Choice((*opt).to_string()))
            .ok_or(ValidationError::NotAnOption),
    }
}

/// 对已经是 [`AnswerValue`] 的值重新校验（恢复的会话、what-if 工作副本）
pub fn revalidate(step: StepKey, value: &AnswerValue) -> Result<AnswerValue, ValidationError> {
    validate_answer(step, &value.to_string())
}

fn parse_number(s: &str) -> Result<f64, ValidationError> {
    match s.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(ValidationError::NotANumber),
    }
}

/// 0.5 一律向上取整（`-0.5` → `0`）
fn round_half_up(n: f64) -> f64 {
    (n + 0.5).floor()
}

fn round_to_cents(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

fn check_range(n: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if n < min {
        return Err(ValidationError::BelowMin { min });
    }
    if n > max {
        return Err(ValidationError::AboveMax { max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_ordered_and_linked() {
        assert_eq!(StepKey::Age.index(), 0);
        assert_eq!(StepKey::Age.next(), Some(StepKey::Tenure));
        assert_eq!(StepKey::PaymentDelay.next(), None);
        assert!(StepKey::PaymentDelay.is_last());
        assert_eq!(StepKey::at(STEP_COUNT), None);
    }

    #[test]
    fn integer_fields_round() {
        assert_eq!(
            validate_answer(StepKey::Age, " 39.6 "),
            Ok(AnswerValue::Integer(40))
        );
        assert_eq!(
            validate_answer(StepKey::Tenure, "120.4"),
            Ok(AnswerValue::Integer(120))
        );
    }

    #[test]
    fn halves_round_up_not_away_from_zero() {
        assert_eq!(
            validate_answer(StepKey::Age, "-0.5"),
            Ok(AnswerValue::Integer(0))
        );
        assert_eq!(
            validate_answer(StepKey::Tenure, "2.5"),
            Ok(AnswerValue::Integer(3))
        );
        assert_eq!(
            validate_answer(StepKey::PaymentDelay, "-0.6"),
            Err(ValidationError::BelowMin { min: 0.0 })
        );
    }

    #[test]
    fn monthly_charges_keep_two_decimals() {
        assert_eq!(
            validate_answer(StepKey::MonthlyCharges, "70.256"),
            Ok(AnswerValue::Decimal(70.26))
        );
    }

    #[test]
    fn rejects_missing_bad_and_out_of_range() {
        assert_eq!(
            validate_answer(StepKey::Age, "  "),
            Err(ValidationError::Required)
        );
        assert_eq!(
            validate_answer(StepKey::Age, "forty"),
            Err(ValidationError::NotANumber)
        );
        assert_eq!(
            validate_answer(StepKey::Age, "-5"),
            Err(ValidationError::BelowMin { min: 0.0 })
        );
        assert_eq!(
            validate_answer(StepKey::PaymentDelay, "61"),
            Err(ValidationError::AboveMax { max: 60.0 })
        );
    }

    #[test]
    fn choice_fields_match_options_exactly() {
        assert_eq!(
            validate_answer(StepKey::Contract, " One year "),
            Ok(AnswerValue::Choice("One year".into()))
        );
        assert_eq!(
            validate_answer(StepKey::InternetService, "dsl"),
            Err(ValidationError::NotAnOption)
        );
    }

    #[test]
    fn parses_step_keys() {
        assert_eq!("monthlyCharges".parse::<StepKey>(), Ok(StepKey::MonthlyCharges));
        assert!("favouriteColour".parse::<StepKey>().is_err());
    }
}
