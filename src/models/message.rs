use serde::{Deserialize, Serialize};

use crate::models::prediction::Prediction;

/// 消息发送方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Question,
    Answer,
    Error,
    Result,
}

/// 对话消息
///
/// `id` 与 `created_at` 在写入会话存储时补齐，状态机本身不生成它们。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Prediction>,
    /// 毫秒时间戳
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl Message {
    fn new(role: Role, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: Some(content.into()),
            kind,
            payload: None,
            created_at: None,
        }
    }

    pub fn question(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageKind::Question, content)
    }

    pub fn answer(content: impl Into<String>) -> Self {
        Self::new(Role::User, MessageKind::Answer, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageKind::Error, content)
    }

    /// 携带完整预测结果的结构化消息
    pub fn result(prediction: Prediction) -> Self {
        Self {
            id: None,
            role: Role::Assistant,
            content: None,
            kind: MessageKind::Result,
            payload: Some(prediction),
            created_at: None,
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}
