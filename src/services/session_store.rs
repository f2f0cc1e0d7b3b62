//! 会话存储服务 - 业务能力层
//!
//! ## 职责
//!
//! 在键值存储端口之上维护一个有容量上限、按最近更新时间排序的会话列表。
//!
//! ## 存储布局
//!
//! - `churn_sessions_v1`：全部会话（JSON 数组）
//! - `churn_active_session_id`：当前活动会话 ID（不存在表示没有活动会话）
//!
//! ## 容量策略
//!
//! 每次写入前都经过 [`restore_recency_order`]：按 `updated_at` 降序稳定排序后截断到
//! [`MAX_SESSIONS`]。被淘汰的总是最久未更新的会话，没有置顶或豁免。
//!
//! 同一存储上的多个实例之间没有协调，后写入者覆盖先写入者。

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppResult, StorageError};
use crate::infrastructure::KeyValueStore;
use crate::models::{Message, Session, SessionDraft, SessionPatch};

/// 最多保存的会话数
pub const MAX_SESSIONS: usize = 30;

/// 会话列表存储键
pub const SESSIONS_KEY: &str = "churn_sessions_v1";

/// 活动会话 ID 存储键
pub const ACTIVE_ID_KEY: &str = "churn_active_session_id";

/// 恢复“按最近更新降序 + 容量上限”不变量
///
/// 排序是稳定的：`updated_at` 相同的记录保持原有先后。
///
/// # 返回
/// 被淘汰的会话
pub fn restore_recency_order(sessions: &mut Vec<Session>) -> Vec<Session> {
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    if sessions.len() > MAX_SESSIONS {
        sessions.split_off(MAX_SESSIONS)
    } else {
        Vec::new()
    }
}

/// 会话存储
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    /// 创建会话存储
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// 全部会话，按 `updated_at` 降序
    pub fn list(&self) -> Vec<Session> {
        let mut sessions = self.read();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// 按 ID 获取完整会话
    pub fn get(&self, id: &str) -> Option<Session> {
        self.read().into_iter().find(|s| s.id == id)
    }

    /// 创建会话
    ///
    /// 未提供 ID 时生成 UUID；未提供标题时使用带日期的默认标题。
    /// 与已有 ID 冲突时替换原记录。
    pub fn create(&self, draft: Option<SessionDraft>) -> AppResult<Session> {
        let session = Session::from_draft(
            draft.unwrap_or_default(),
            Uuid::new_v4().to_string(),
            Utc::now(),
        );
        info!("📝 创建会话 {} ({})", session.id, session.title);
        self.put_front(session.clone())?;
        Ok(session)
    }

    /// 整体替换或插入，刷新 `updated_at` 并按最近更新重新定位
    pub fn upsert(&self, mut session: Session) -> AppResult<Session> {
        session.updated_at = Utc::now();
        debug!("保存会话 {} ({} 条消息)", session.id, session.messages.len());
        self.put_front(session.clone())?;
        Ok(session)
    }

    /// 合并局部字段
    ///
    /// # 返回
    /// 会话不存在时返回 `Ok(None)`，不做任何写入
    pub fn update(&self, id: &str, patch: SessionPatch) -> AppResult<Option<Session>> {
        let Some(mut session) = self.get(id) else {
            debug!("更新会话 {} 失败: 不存在", id);
            return Ok(None);
        };
        session.apply(patch);
        session.updated_at = Utc::now();
        self.put_front(session.clone())?;
        Ok(Some(session))
    }

    /// 用给定消息整体替换会话消息，补齐缺失的 ID 与时间戳
    pub fn replace_messages(&self, id: &str, messages: Vec<Message>) -> AppResult<Option<Session>> {
        let messages = messages.into_iter().map(normalize_message).collect();
        self.update(
            id,
            SessionPatch {
                messages: Some(messages),
                ..Default::default()
            },
        )
    }

    /// 追加一条消息
    pub fn append_message(&self, id: &str, message: Message) -> AppResult<Option<Session>> {
        let Some(session) = self.get(id) else {
            return Ok(None);
        };
        let mut messages = session.messages;
        messages.push(normalize_message(message));
        self.update(
            id,
            SessionPatch {
                messages: Some(messages),
                ..Default::default()
            },
        )
    }

    /// 删除会话
    ///
    /// 若删除的是活动会话，同时清除活动会话 ID；选择后备会话由调用方负责。
    ///
    /// # 返回
    /// 是否删除了记录
    pub fn delete(&self, id: &str) -> AppResult<bool> {
        let mut sessions = self.read();
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        let removed = sessions.len() != before;
        self.write(sessions)?;

        if self.active_session_id().as_deref() == Some(id) {
            self.set_active_session_id(None)?;
        }
        if removed {
            info!("🗑️ 删除会话 {}", id);
        }
        Ok(removed)
    }

    /// 重命名，不改变 `updated_at` 与排序位置
    pub fn rename(&self, id: &str, title: impl Into<String>) -> AppResult<Option<Session>> {
        let mut sessions = self.read();
        let Some(session) = sessions.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        session.title = title.into();
        let renamed = session.clone();
        self.write(sessions)?;
        Ok(Some(renamed))
    }

    /// 导出为格式化 JSON
    pub fn export(&self, id: &str) -> AppResult<Option<String>> {
        match self.get(id) {
            Some(session) => Ok(Some(
                serde_json::to_string_pretty(&session).map_err(StorageError::from)?,
            )),
            None => Ok(None),
        }
    }

    /// 当前活动会话 ID
    pub fn active_session_id(&self) -> Option<String> {
        match self.storage.get(ACTIVE_ID_KEY) {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(e) => {
                warn!("读取活动会话失败: {}", e);
                None
            }
        }
    }

    /// 设置或清除活动会话 ID
    pub fn set_active_session_id(&self, id: Option<&str>) -> AppResult<()> {
        match id {
            Some(id) => self.storage.set(ACTIVE_ID_KEY, id)?,
            None => self.storage.remove(ACTIVE_ID_KEY)?,
        }
        Ok(())
    }

    // ========== 内部读写 ==========

    /// 把会话放到列表最前（替换同 ID 记录）后写回
    fn put_front(&self, session: Session) -> AppResult<()> {
        let mut sessions = self.read();
        sessions.retain(|s| s.id != session.id);
        sessions.insert(0, session);
        self.write(sessions)
    }

    /// 读取会话列表；缺失或损坏时视为空
    fn read(&self) -> Vec<Session> {
        let raw = match self.storage.get(SESSIONS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("⚠️ 读取会话列表失败: {}", e);
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("⚠️ 会话列表损坏，按空列表处理: {}", e);
            Vec::new()
        })
    }

    fn write(&self, mut sessions: Vec<Session>) -> AppResult<()> {
        let evicted = restore_recency_order(&mut sessions);
        if !evicted.is_empty() {
            debug!(
                "容量已满，淘汰 {} 个最久未更新的会话: {:?}",
                evicted.len(),
                evicted.iter().map(|s| s.id.as_str()).collect::<Vec<_>>()
            );
        }
        let json = serde_json::to_string(&sessions).map_err(StorageError::from)?;
        self.storage.set(SESSIONS_KEY, &json)?;
        Ok(())
    }
}

fn normalize_message(mut message: Message) -> Message {
    if message.id.is_none() {
        message.id = Some(Uuid::new_v4().to_string());
    }
    if message.created_at.is_none() {
        message.created_at = Some(Utc::now().timestamp_millis());
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemoryStore;
    use crate::models::{Label, Prediction, Status};
    use tokio_test::assert_ok;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()))
    }

    fn draft(id: &str) -> Option<SessionDraft> {
        Some(SessionDraft {
            id: Some(id.to_string()),
            ..Default::default()
        })
    }

    fn ids(store: &SessionStore) -> Vec<String> {
        store.list().into_iter().map(|s| s.id).collect()
    }

    #[test]
    fn create_generates_id_and_defaults() {
        let store = store();
        let session = assert_ok!(store.create(None));
        assert!(!session.id.is_empty());
        assert!(session.title.starts_with("New session ("));
        assert_eq!(session.status, Status::Collecting);
        assert_eq!(session.current_step_index, Some(0));
        assert_eq!(store.get(&session.id), Some(session));
    }

    #[test]
    fn thirty_first_session_evicts_least_recently_updated() {
        let store = store();
        for i in 0..MAX_SESSIONS {
            assert_ok!(store.create(draft(&format!("s{i}"))));
        }
        assert_eq!(store.list().len(), MAX_SESSIONS);

        assert_ok!(store.create(draft("s30")));
        let ids = ids(&store);
        assert_eq!(ids.len(), MAX_SESSIONS);
        assert_eq!(ids[0], "s30");
        assert!(!ids.contains(&"s0".to_string()));
        assert!(ids.contains(&"s1".to_string()));
    }

    #[test]
    fn update_refreshes_recency_and_protects_from_eviction() {
        let store = store();
        for i in 0..MAX_SESSIONS {
            assert_ok!(store.create(draft(&format!("s{i}"))));
        }
        store
            .update(
                "s0",
                SessionPatch {
                    title: Some("touched".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .expect("s0 exists");

        assert_ok!(store.create(draft("s30")));
        let ids = ids(&store);
        assert!(ids.contains(&"s0".to_string()));
        assert!(!ids.contains(&"s1".to_string()));
    }

    #[test]
    fn update_of_missing_id_is_not_found() {
        let store = store();
        let result = assert_ok!(store.update("nope", SessionPatch::default()));
        assert!(result.is_none());
        assert!(store.list().is_empty());
    }

    #[test]
    fn upsert_inserts_then_replaces() {
        let store = store();
        let mut session = assert_ok!(store.create(draft("a")));
        assert_ok!(store.create(draft("b")));
        assert_eq!(ids(&store), ["b", "a"]);

        session.status = Status::Done;
        session.prediction = Some(Prediction::new(Label::NoChurn, 0.2));
        let saved = assert_ok!(store.upsert(session));
        assert!(saved.updated_at >= saved.created_at);
        assert_eq!(ids(&store), ["a", "b"]);
        assert_eq!(store.get("a").unwrap().status, Status::Done);
    }

    #[test]
    fn rename_keeps_position_and_timestamp() {
        let store = store();
        let a = assert_ok!(store.create(draft("a")));
        assert_ok!(store.create(draft("b")));

        let renamed = assert_ok!(store.rename("a", "Customer 42")).unwrap();
        assert_eq!(renamed.title, "Customer 42");
        assert_eq!(renamed.updated_at, a.updated_at);
        assert_eq!(ids(&store), ["b", "a"]);
        assert!(store.rename("zzz", "x").unwrap().is_none());
    }

    #[test]
    fn replace_messages_fills_ids_and_timestamps() {
        let store = store();
        assert_ok!(store.create(draft("a")));

        let session = store
            .replace_messages("a", vec![Message::question("Hi"), Message::answer("40")])
            .unwrap()
            .unwrap();
        assert_eq!(session.messages.len(), 2);
        assert!(session.messages.iter().all(|m| m.id.is_some() && m.created_at.is_some()));

        let session = store
            .append_message("a", Message::error("oops"))
            .unwrap()
            .unwrap();
        assert_eq!(session.messages.len(), 3);
        assert!(store.replace_messages("missing", vec![]).unwrap().is_none());
    }

    #[test]
    fn delete_clears_active_id_only_for_deleted_session() {
        let store = store();
        assert_ok!(store.create(draft("a")));
        assert_ok!(store.create(draft("b")));
        assert_ok!(store.set_active_session_id(Some("a")));

        assert!(store.delete("b").unwrap());
        assert_eq!(store.active_session_id().as_deref(), Some("a"));

        assert!(store.delete("a").unwrap());
        assert_eq!(store.active_session_id(), None);
        assert!(!store.delete("a").unwrap());
    }

    #[test]
    fn export_is_pretty_json_with_explicit_nulls() {
        let store = store();
        assert_ok!(store.create(draft("a")));
        let json = assert_ok!(store.export("a")).unwrap();
        assert!(json.contains("\n"));
        assert!(json.contains("\"prediction\": null"));
        assert_eq!(store.export("missing").unwrap(), None);
    }

    #[test]
    fn corrupt_storage_reads_as_empty() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(SESSIONS_KEY, "{not json").unwrap();
        let store = SessionStore::new(storage);
        assert!(store.list().is_empty());
        assert_ok!(store.create(draft("a")));
        assert_eq!(ids(&store), ["a"]);
    }
}
