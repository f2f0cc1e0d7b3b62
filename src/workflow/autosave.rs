//! 会话自动保存 - 流程层
//!
//! 把对话状态防抖写入 [`SessionStore`]。切换会话、新建会话、删除会话和退出前
//! 必须先调用 [`SessionAutosave::flush`]，保证最后一次修改写到正确的会话上。

use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::infrastructure::Debouncer;
use crate::models::{derive_title, ConversationState, Session, SessionDraft, SessionPatch, UiPreferences};
use crate::services::SessionStore;

/// 一次待执行的保存
struct SaveRequest {
    session_id: String,
    state: ConversationState,
    ui: UiPreferences,
}

/// 防抖保存器
pub struct SessionAutosave {
    debouncer: Debouncer<SaveRequest>,
}

impl SessionAutosave {
    /// 创建自动保存器
    ///
    /// # 参数
    /// - `store`: 会话存储
    /// - `delay`: 防抖间隔
    pub fn new(store: SessionStore, delay: Duration) -> Self {
        let debouncer = Debouncer::new(delay, move |request: SaveRequest| {
            save(&store, request);
        });
        Self { debouncer }
    }

    /// 调度一次保存，覆盖之前尚未执行的保存
    pub fn schedule(&self, session_id: &str, state: &ConversationState, ui: &UiPreferences) {
        self.debouncer.schedule(SaveRequest {
            session_id: session_id.to_string(),
            state: state.clone(),
            ui: ui.clone(),
        });
    }

    /// 立即写入尚未执行的保存
    pub fn flush(&self) -> bool {
        self.debouncer.flush()
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }
}

fn save(store: &SessionStore, request: SaveRequest) {
    let SaveRequest { session_id, state, ui } = request;
    let now = Utc::now();

    let mut session = store.get(&session_id).unwrap_or_else(|| {
        debug!("会话 {} 不存在，自动保存时新建", session_id);
        Session::from_draft(SessionDraft::default(), session_id.clone(), now)
    });

    let mut patch = SessionPatch::from_state(&state);
    patch.title = Some(derive_title(&state, now));
    patch.ui = Some(ui);
    session.apply(patch);

    if let Err(e) = store.upsert(session) {
        warn!("⚠️ 自动保存会话 {} 失败: {}", session_id, e);
    }
}
