//! 对话控制器 - 流程层
//!
//! ## 职责
//!
//! - 持有当前对话状态，所有修改都经过 [`reduce`]
//! - 确认预测后停顿片刻再调用评分器，并把结果回灌到状态机
//! - 绑定会话时，每次修改都防抖保存；切换 / 新建 / 删除会话前先 flush
//!
//! 控制器不决定删除当前会话后要切到哪个会话，这由调用方处理。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::{AnswerSet, ConversationState, Session, Status, UiPreferences};
use crate::services::{Scorer, SessionStore};
use crate::workflow::autosave::SessionAutosave;
use crate::workflow::flow_state::{initial_state, reduce, Action};

/// 右侧面板：资料 / 分析 / what-if（需要先有预测）
pub const RIGHT_TABS: [&str; 3] = ["profile", "insights", "whatif"];

/// 会话绑定：存储 + 自动保存 + 当前会话 ID
struct Binding {
    store: SessionStore,
    autosave: SessionAutosave,
    session_id: Option<String>,
}

/// 对话控制器
pub struct FlowController {
    state: ConversationState,
    scorer: Arc<dyn Scorer>,
    predict_delay: Duration,
    ui: UiPreferences,
    binding: Option<Binding>,
}

impl FlowController {
    /// 创建不落盘的控制器
    ///
    /// # 参数
    /// - `scorer`: 评分器
    /// - `predict_delay`: 确认预测后到调用评分器之间的停顿
    pub fn new(scorer: Arc<dyn Scorer>, predict_delay: Duration) -> Self {
        Self {
            state: initial_state(),
            scorer,
            predict_delay,
            ui: UiPreferences::default(),
            binding: None,
        }
    }

    /// 启用会话持久化
    pub fn with_persistence(mut self, store: SessionStore, autosave_delay: Duration) -> Self {
        self.binding = Some(Binding {
            autosave: SessionAutosave::new(store.clone(), autosave_delay),
            store,
            session_id: None,
        });
        self
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn ui(&self) -> &UiPreferences {
        &self.ui
    }

    /// 当前绑定的会话 ID
    pub fn session_id(&self) -> Option<&str> {
        self.binding.as_ref()?.session_id.as_deref()
    }

    /// 执行一个动作并调度保存
    pub fn dispatch(&mut self, action: Action) -> &ConversationState {
        let state = std::mem::take(&mut self.state);
        self.state = reduce(state, action);
        self.schedule_save();
        &self.state
    }

    /// 把一行输入交给当前激活的步骤（收集中为当前问题，编辑中为被编辑字段）
    ///
    /// # 返回
    /// 当前没有接收输入的步骤时返回 `false`
    pub fn submit(&mut self, raw: &str) -> bool {
        let Some(step) = self.state.active_step() else {
            return false;
        };
        let action = match self.state.status {
            Status::Editing => Action::ApplyEdit {
                step,
                raw: raw.to_string(),
            },
            _ => Action::AnswerSubmit {
                step,
                raw: raw.to_string(),
            },
        };
        self.dispatch(action);
        true
    }

    /// 确认并执行预测
    ///
    /// 不在复核阶段时忽略；评分失败回到复核阶段，答案保留。
    pub async fn confirm_predict(&mut self) -> &ConversationState {
        self.dispatch(Action::ConfirmPredict);
        if self.state.status != Status::Predicting {
            debug!("当前状态 {:?} 不能预测，忽略", self.state.status);
            return &self.state;
        }

        tokio::time::sleep(self.predict_delay).await;

        let outcome = match AnswerSet::from_answers(&self.state.answers) {
            Ok(answers) => self.scorer.score(&answers).await.map_err(|e| e.user_message()),
            Err((step, e)) => Err(format!("{}: {}", step, e)),
        };

        match outcome {
            Ok(prediction) => {
                info!("✅ 预测完成: {}", prediction.summary());
                self.ui.right_tab = "insights".to_string();
                self.dispatch(Action::PredictSuccess(prediction))
            }
            Err(message) => {
                warn!("⚠️ 预测失败: {}", message);
                self.dispatch(Action::PredictError {
                    message: Some(message),
                })
            }
        }
    }

    /// 切换右侧面板，随会话一起保存
    ///
    /// # 返回
    /// 未知面板，或还没有预测结果时切到 `whatif`，返回 `false`
    pub fn set_right_tab(&mut self, tab: &str) -> bool {
        let allowed = match tab {
            "whatif" => self.state.prediction.is_some(),
            _ => RIGHT_TABS.contains(&tab),
        };
        if !allowed {
            debug!("不能切换到面板 {}", tab);
            return false;
        }
        self.ui.right_tab = tab.to_string();
        self.schedule_save();
        true
    }

    /// 立即写入尚未执行的保存
    pub fn flush(&self) -> bool {
        self.binding
            .as_ref()
            .map(|b| b.autosave.flush())
            .unwrap_or(false)
    }

    /// 打开已有会话
    ///
    /// # 返回
    /// 会话不存在时返回 `Ok(false)`，当前状态不变
    pub fn open_session(&mut self, id: &str) -> AppResult<bool> {
        self.flush();
        let Some(binding) = self.binding.as_mut() else {
            return Ok(false);
        };
        let Some(session) = binding.store.get(id) else {
            debug!("会话 {} 不存在", id);
            return Ok(false);
        };

        binding.store.set_active_session_id(Some(id))?;
        binding.session_id = Some(id.to_string());
        self.ui = session.ui.clone();
        let state = std::mem::take(&mut self.state);
        self.state = reduce(state, Action::Restore(Box::new(session)));
        if self.state.prediction.is_none() && self.ui.right_tab == "whatif" {
            self.ui.right_tab = "insights".to_string();
        }
        info!("📂 打开会话 {}", id);
        Ok(true)
    }

    /// 新建会话并切换过去
    pub fn new_session(&mut self) -> AppResult<Option<Session>> {
        self.flush();
        let Some(binding) = self.binding.as_mut() else {
            self.state = initial_state();
            return Ok(None);
        };

        let session = binding.store.create(None)?;
        binding.store.set_active_session_id(Some(&session.id))?;
        binding.session_id = Some(session.id.clone());
        self.ui = session.ui.clone();
        self.state = initial_state();
        self.schedule_save();
        Ok(Some(session))
    }

    /// 删除会话
    ///
    /// 删除的是当前会话时解除绑定并清空对话。
    pub fn delete_session(&mut self, id: &str) -> AppResult<bool> {
        self.flush();
        let Some(binding) = self.binding.as_mut() else {
            return Ok(false);
        };

        let deleted = binding.store.delete(id)?;
        if binding.session_id.as_deref() == Some(id) {
            binding.session_id = None;
            self.state = initial_state();
            self.ui = UiPreferences::default();
        }
        Ok(deleted)
    }

    fn schedule_save(&self) {
        if let Some(Binding {
            autosave,
            session_id: Some(id),
            ..
        }) = &self.binding
        {
            autosave.schedule(id, &self.state, &self.ui);
        }
    }
}

impl Drop for FlowController {
    fn drop(&mut self) {
        if self.flush() {
            debug!("退出前写入挂起的会话保存");
        }
    }
}
