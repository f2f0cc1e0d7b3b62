//! 对话状态机 - 流程层
//!
//! 纯函数 `reduce(state, action) -> state'`，不做 IO、不碰定时器。
//! 定时、评分调用与持久化由 [`crate::workflow::FlowController`] 在外部完成。
//!
//! 状态流转：
//!
//! ```text
//! collecting ──(最后一步)──▶ review ──confirm──▶ predicting ──success──▶ done
//!                            ▲   │                  │
//!                 apply/cancel   start_edit          └──error──▶ review
//!                            │   ▼
//!                           editing
//! ```
//!
//! 当前状态不允许的动作原样返回状态。

use crate::models::{
    first_unanswered, validate_answer, AnswerSet, Answers, ConversationState, Message, Prediction,
    Session, Status, StepKey, STEPS, STEP_COUNT,
};

/// 复核提示
pub const REVIEW_PROMPT: &str = "Review your answers below. You can edit any field.";
/// 预测失败的默认提示
pub const PREDICT_ERROR_FALLBACK: &str = "Something went wrong. Please try again.";
const INSIGHTS_FOLLOW_UP: &str = "See the Insights panel for key drivers.";
const RETENTION_FOLLOW_UP: &str = "Here's a suggested retention plan. See the Insights panel.";

/// 状态机动作
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// 空对话时补上第一个问题
    Init,
    /// 从持久化的会话恢复
    Restore(Box<Session>),
    /// 回答当前问题
    AnswerSubmit { step: StepKey, raw: String },
    /// 复核阶段开始编辑某个字段
    StartEdit { step: StepKey },
    /// 提交编辑
    ApplyEdit { step: StepKey, raw: String },
    /// 放弃编辑
    CancelEdit,
    /// 确认提交评分
    ConfirmPredict,
    /// 评分成功
    PredictSuccess(Prediction),
    /// 评分失败
    PredictError { message: Option<String> },
    /// 重新开始
    Reset,
    /// 重新开始（界面上的“重新填写”按钮）
    ResetFlow,
}

/// 初始对话：只有第一个问题
pub fn initial_state() -> ConversationState {
    ConversationState {
        messages: initial_messages(),
        ..ConversationState::default()
    }
}

fn initial_messages() -> Vec<Message> {
    vec![Message::question(STEPS[0].question())]
}

fn edit_prompt(step: StepKey) -> String {
    format!("Okay, update {}:", step.short_label())
}

/// 状态转移
pub fn reduce(state: ConversationState, action: Action) -> ConversationState {
    match action {
        Action::Init => {
            if state.messages.is_empty() {
                ConversationState {
                    messages: initial_messages(),
                    ..state
                }
            } else {
                state
            }
        }
        Action::Restore(session) => restore(*session),
        Action::Reset | Action::ResetFlow => initial_state(),
        Action::AnswerSubmit { step, raw } => answer_submit(state, step, &raw),
        Action::StartEdit { step } => {
            if state.status != Status::Review {
                return state;
            }
            let mut next = state;
            next.status = Status::Editing;
            next.edit_step_key = Some(step);
            next.messages.push(Message::question(edit_prompt(step)));
            next
        }
        Action::ApplyEdit { step, raw } => apply_edit(state, step, &raw),
        Action::CancelEdit => {
            if state.status != Status::Editing {
                return state;
            }
            ConversationState {
                status: Status::Review,
                edit_step_key: None,
                ..state
            }
        }
        Action::ConfirmPredict => {
            if state.status != Status::Review || !state.is_complete() {
                return state;
            }
            ConversationState {
                status: Status::Predicting,
                prediction: None,
                ..state
            }
        }
        Action::PredictSuccess(prediction) => {
            if state.status != Status::Predicting {
                return state;
            }
            let mut next = state;
            next.messages.extend([
                Message::question(prediction.summary()),
                Message::result(prediction.clone()),
                Message::question(INSIGHTS_FOLLOW_UP),
                Message::question(RETENTION_FOLLOW_UP),
            ]);
            next.status = Status::Done;
            next.prediction = Some(prediction);
            next
        }
        Action::PredictError { message } => {
            if state.status != Status::Predicting {
                return state;
            }
            let message = message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| PREDICT_ERROR_FALLBACK.to_string());
            let mut next = state;
            next.messages.push(Message::error(message));
            next.status = Status::Review;
            next.prediction = None;
            next
        }
    }
}

fn answer_submit(state: ConversationState, step: StepKey, raw: &str) -> ConversationState {
    if state.status != Status::Collecting || state.current_step() != Some(step) {
        return state;
    }

    let mut next = state;
    match validate_answer(step, raw) {
        Err(e) => {
            next.messages.extend([
                Message::answer(raw),
                Message::error(e.to_string()),
                Message::question(step.question()),
            ]);
        }
        Ok(value) => {
            next.messages.push(Message::answer(value.to_string()));
            next.answers.insert(step, value);
            match step.next() {
                Some(next_step) => {
                    next.current_step_index = next_step.index();
                    next.messages.push(Message::question(next_step.question()));
                }
                None => {
                    next.current_step_index = STEP_COUNT;
                    next.status = Status::Review;
                    next.messages.push(Message::question(REVIEW_PROMPT));
                }
            }
        }
    }
    next
}

fn apply_edit(state: ConversationState, step: StepKey, raw: &str) -> ConversationState {
    if state.status != Status::Editing || state.edit_step_key != Some(step) {
        return state;
    }

    let mut next = state;
    match validate_answer(step, raw) {
        Err(e) => {
            next.messages.extend([
                Message::answer(raw),
                Message::error(e.to_string()),
                Message::question(edit_prompt(step)),
            ]);
        }
        Ok(value) => {
            next.messages.extend([
                Message::answer(value.to_string()),
                Message::question(format!(
                    "Updated {} to {}.",
                    step.short_label().to_lowercase(),
                    value
                )),
            ]);
            next.answers.insert(step, value);
            next.status = Status::Review;
            next.edit_step_key = None;
        }
    }
    next
}

fn restore(session: Session) -> ConversationState {
    let messages = if session.messages.is_empty() {
        initial_messages()
    } else {
        session.messages
    };
    let complete = AnswerSet::from_answers(&session.answers).is_ok();

    // 预测只在 done 且六项答案都合法时保留；
    // 保存于 predicting 的会话，请求已随进程结束，回到可重试的状态
    let (status, prediction) = match session.status {
        Status::Done if complete && session.prediction.is_some() => {
            (Status::Done, session.prediction)
        }
        Status::Done | Status::Predicting => (resume_status(&session.answers), None),
        other => (other, None),
    };
    // 状态被改写时按答案重新定位
    let current_step_index = match session.current_step_index {
        Some(index) if status == session.status => index,
        _ => first_unanswered(&session.answers),
    }
    .min(STEP_COUNT);
    let edit_step_key = match status {
        Status::Editing => session.edit_step_key,
        _ => None,
    };

    ConversationState {
        current_step_index,
        answers: session.answers,
        messages,
        status,
        prediction,
        edit_step_key,
    }
}

/// 答案齐全时回到复核，否则回到第一个未回答的问题
fn resume_status(answers: &Answers) -> Status {
    if first_unanswered(answers) < STEP_COUNT {
        Status::Collecting
    } else {
        Status::Review
    }
}
