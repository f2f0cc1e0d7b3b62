//! 流程层（Workflow）
//!
//! 定义“一次对话”怎么走：状态机、预测调用节奏、会话自动保存。

pub mod autosave;
pub mod flow_controller;
pub mod flow_state;

pub use autosave::SessionAutosave;
pub use flow_controller::{FlowController, RIGHT_TABS};
pub use flow_state::{initial_state, reduce, Action};
