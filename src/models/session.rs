use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::models::answer::Answers;
use crate::models::conversation::{ConversationState, Status};
use crate::models::message::Message;
use crate::models::prediction::Prediction;
use crate::models::step::StepKey;

/// 界面偏好
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPreferences {
    pub right_tab: String,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            right_tab: "profile".to_string(),
        }
    }
}

/// 持久化的会话快照
///
/// 序列化时所有字段都会输出，可空字段显式写为 `null`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub current_step_index: Option<usize>,
    #[serde(default)]
    pub answers: Answers,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub prediction: Option<Prediction>,
    #[serde(default)]
    pub edit_step_key: Option<StepKey>,
    #[serde(default)]
    pub ui: UiPreferences,
}

/// 创建会话时可选的初始字段
#[derive(Debug, Clone, Default)]
pub struct SessionDraft {
    pub id: Option<String>,
    pub title: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub current_step_index: Option<usize>,
    pub answers: Option<Answers>,
    pub messages: Option<Vec<Message>>,
    pub status: Option<Status>,
    pub prediction: Option<Prediction>,
    pub edit_step_key: Option<StepKey>,
    pub ui: Option<UiPreferences>,
}

/// 局部更新
///
/// 外层 `None` 表示不修改；可空字段用 `Some(None)` 清空。
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub current_step_index: Option<Option<usize>>,
    pub answers: Option<Answers>,
    pub messages: Option<Vec<Message>>,
    pub status: Option<Status>,
    pub prediction: Option<Option<Prediction>>,
    pub edit_step_key: Option<Option<StepKey>>,
    pub ui: Option<UiPreferences>,
}

impl SessionPatch {
    /// 用对话状态覆盖会话的全部对话字段
    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            title: None,
            current_step_index: Some(Some(state.current_step_index)),
            answers: Some(state.answers.clone()),
            messages: Some(state.messages.clone()),
            status: Some(state.status),
            prediction: Some(state.prediction.clone()),
            edit_step_key: Some(state.edit_step_key),
            ui: None,
        }
    }
}

impl Session {
    /// 按草稿创建新会话，缺省字段取默认值
    pub fn from_draft(draft: SessionDraft, id: String, now: DateTime<Utc>) -> Self {
        Self {
            id: draft.id.unwrap_or(id),
            title: draft.title.unwrap_or_else(|| default_title(now)),
            created_at: draft.created_at.unwrap_or(now),
            updated_at: now,
            current_step_index: Some(draft.current_step_index.unwrap_or(0)),
            answers: draft.answers.unwrap_or_default(),
            messages: draft.messages.unwrap_or_default(),
            status: draft.status.unwrap_or_default(),
            prediction: draft.prediction,
            edit_step_key: draft.edit_step_key,
            ui: draft.ui.unwrap_or_default(),
        }
    }

    /// 合并局部字段（不修改 `updated_at`，由存储层负责）
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(index) = patch.current_step_index {
            self.current_step_index = index;
        }
        if let Some(answers) = patch.answers {
            self.answers = answers;
        }
        if let Some(messages) = patch.messages {
            self.messages = messages;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(prediction) = patch.prediction {
            self.prediction = prediction;
        }
        if let Some(key) = patch.edit_step_key {
            self.edit_step_key = key;
        }
        if let Some(ui) = patch.ui {
            self.ui = ui;
        }
    }
}

/// 日期短格式，例如 `Oct 18`
fn short_date(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%b %-d").to_string()
}

/// 默认标题 `New session (Oct 18)`
pub fn default_title(now: DateTime<Utc>) -> String {
    format!("New session ({})", short_date(now))
}

/// 根据对话进度生成标题
pub fn derive_title(state: &ConversationState, now: DateTime<Utc>) -> String {
    let short = short_date(now);
    if let Some(prediction) = &state.prediction {
        return format!("Churn: {}% ({})", prediction.risk_pct(), short);
    }
    if !state.answers.is_empty() {
        return format!("In progress ({})", short);
    }
    format!("New session ({})", short)
}
