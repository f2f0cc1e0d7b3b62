//! what-if 增量重算 - 编排层
//!
//! ## 职责
//!
//! 在一份基线答案的工作副本上修改字段，静默 400ms 后重新评分：
//!
//! - 任一字段不合法时静默跳过（不调用、不报错）
//! - 请求体与上次实际提交的按值相同则跳过
//! - 成功时保存结果与更新时间；失败时记录错误，保留上一次的结果
//! - 晚于新请求返回的旧响应直接丢弃
//! - 重置时恢复基线输入与结果，并把“上次提交”设为基线请求体
//!
//! 没有基线预测时不做任何重算。

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::infrastructure::Debouncer;
use crate::models::{validate_answer, AnswerSet, Answers, Prediction, StepKey, STEPS};
use crate::services::Scorer;

const UPDATE_FAILED: &str = "Update failed.";

/// 重算状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RescoreStatus {
    #[default]
    Idle,
    Loading,
    Error,
}

/// 单次重算的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeOutcome {
    /// 没有基线预测
    NoBaseline,
    /// 有字段不合法
    Invalid,
    /// 请求体与上次提交的相同
    Unchanged,
    Updated,
    Failed,
    /// 期间已有更新的请求或重置，响应被丢弃
    Stale,
}

/// 对外可见的 what-if 状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhatIfSnapshot {
    pub inputs: BTreeMap<StepKey, String>,
    pub result: Option<Prediction>,
    pub status: RescoreStatus,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

struct WhatIfState {
    view: WhatIfSnapshot,
    baseline_answers: Answers,
    baseline_prediction: Option<Prediction>,
    last_body: Option<AnswerSet>,
    seq: u64,
}

impl WhatIfState {
    fn new(baseline_answers: Answers, baseline_prediction: Option<Prediction>) -> Self {
        let mut state = Self {
            view: WhatIfSnapshot::default(),
            baseline_answers,
            baseline_prediction,
            last_body: None,
            seq: 0,
        };
        state.reset();
        state
    }

    fn reset(&mut self) {
        self.view = WhatIfSnapshot {
            inputs: self
                .baseline_answers
                .iter()
                .map(|(k, v)| (*k, v.to_string()))
                .collect(),
            result: self.baseline_prediction.clone(),
            ..WhatIfSnapshot::default()
        };
        self.last_body = AnswerSet::from_answers(&self.baseline_answers).ok();
        // 让仍在路上的响应失效
        self.seq += 1;
    }
}

struct Inner {
    scorer: Arc<dyn Scorer>,
    state: Mutex<WhatIfState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, WhatIfState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn recompute(&self) -> RecomputeOutcome {
        let (body, seq) = {
            let mut state = self.lock();
            if state.baseline_prediction.is_none() {
                return RecomputeOutcome::NoBaseline;
            }
            let Some(body) = build_body(&state.view.inputs) else {
                debug!("what-if 输入不完整或不合法，跳过重算");
                return RecomputeOutcome::Invalid;
            };
            if state.last_body.as_ref() == Some(&body) {
                return RecomputeOutcome::Unchanged;
            }

            state.last_body = Some(body.clone());
            state.seq += 1;
            state.view.status = RescoreStatus::Loading;
            state.view.error = None;
            (body, state.seq)
        };

        debug!("what-if 重算 #{}: {:?}", seq, body);
        let outcome = self.scorer.score(&body).await;

        let mut state = self.lock();
        if state.seq != seq {
            debug!("丢弃过期的 what-if 响应 #{}", seq);
            return RecomputeOutcome::Stale;
        }
        match outcome {
            Ok(prediction) => {
                state.view.result = Some(prediction);
                state.view.status = RescoreStatus::Idle;
                state.view.last_updated = Some(Utc::now());
                RecomputeOutcome::Updated
            }
            Err(e) => {
                warn!("what-if 重算失败: {}", e);
                let message = e.user_message();
                state.view.status = RescoreStatus::Error;
                state.view.error = Some(if message.is_empty() {
                    UPDATE_FAILED.to_string()
                } else {
                    message
                });
                RecomputeOutcome::Failed
            }
        }
    }
}

/// 所有字段都合法时构造请求体
fn build_body(inputs: &BTreeMap<StepKey, String>) -> Option<AnswerSet> {
    let mut answers = Answers::new();
    for step in STEPS {
        let raw = inputs.get(&step)?;
        answers.insert(step, validate_answer(step, raw).ok()?);
    }
    AnswerSet::from_answers(&answers).ok()
}

/// what-if 重算器
pub struct IncrementalRescorer {
    inner: Arc<Inner>,
    debouncer: Debouncer<()>,
}

impl IncrementalRescorer {
    /// 创建重算器
    ///
    /// # 参数
    /// - `scorer`: 评分器
    /// - `baseline_answers`: 基线答案
    /// - `baseline_prediction`: 基线预测；为空时不会重算
    /// - `delay`: 防抖间隔
    pub fn new(
        scorer: Arc<dyn Scorer>,
        baseline_answers: Answers,
        baseline_prediction: Option<Prediction>,
        delay: Duration,
    ) -> Self {
        let inner = Arc::new(Inner {
            scorer,
            state: Mutex::new(WhatIfState::new(baseline_answers, baseline_prediction)),
        });

        let shared = Arc::clone(&inner);
        let debouncer = Debouncer::new(delay, move |()| {
            let inner = Arc::clone(&shared);
            tokio::spawn(async move {
                inner.recompute().await;
            });
        });

        Self { inner, debouncer }
    }

    /// 修改一个字段并重新计时
    pub fn edit_field(&self, step: StepKey, raw: impl Into<String>) {
        self.inner.lock().view.inputs.insert(step, raw.into());
        self.debouncer.schedule(());
    }

    /// 跳过防抖立即重算
    pub async fn recompute_now(&self) -> RecomputeOutcome {
        self.debouncer.cancel();
        self.inner.recompute().await
    }

    /// 恢复基线输入与结果
    pub fn reset_to_baseline(&self) {
        self.debouncer.cancel();
        self.inner.lock().reset();
    }

    /// 基线变化（例如对话得到新的预测）时同步
    pub fn rebase(&self, baseline_answers: Answers, baseline_prediction: Option<Prediction>) {
        self.debouncer.cancel();
        *self.inner.lock() = WhatIfState::new(baseline_answers, baseline_prediction);
    }

    pub fn snapshot(&self) -> WhatIfSnapshot {
        self.inner.lock().view.clone()
    }

    /// 当前结果相对基线的变化（百分点，四舍五入）
    pub fn delta_pct_points(&self) -> Option<i64> {
        let state = self.inner.lock();
        let current = state.view.result.as_ref()?.score;
        let base = state.baseline_prediction.as_ref()?.score;
        Some(((current - base) * 100.0).round() as i64)
    }

    /// 某个字段当前输入的校验错误
    pub fn field_error(&self, step: StepKey) -> Option<String> {
        let state = self.inner.lock();
        let raw = state.view.inputs.get(&step).map(String::as_str).unwrap_or("");
        validate_answer(step, raw).err().map(|e| e.to_string())
    }
}
