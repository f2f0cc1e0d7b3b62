use serde::{Deserialize, Serialize};

use crate::models::answer::Answers;
use crate::models::message::Message;
use crate::models::prediction::Prediction;
use crate::models::step::{StepKey, STEPS};

/// 对话阶段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Collecting,
    Editing,
    Review,
    Predicting,
    Done,
}

/// 一次对话的工作副本
///
/// 只通过 [`crate::workflow::reduce`] 修改。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub current_step_index: usize,
    pub answers: Answers,
    pub messages: Vec<Message>,
    pub status: Status,
    pub prediction: Option<Prediction>,
    pub edit_step_key: Option<StepKey>,
}

impl ConversationState {
    /// 当前正在提问的步骤；全部答完后为 `None`
    pub fn current_step(&self) -> Option<StepKey> {
        STEPS.get(self.current_step_index).copied()
    }

    /// 输入框当前对应的步骤（编辑模式下为被编辑的字段）
    pub fn active_step(&self) -> Option<StepKey> {
        match self.status {
            Status::Editing => self.edit_step_key,
            Status::Collecting => self.current_step(),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        STEPS.iter().all(|k| self.answers.contains_key(k))
    }
}
