//! # Churn Assist
//!
//! 客户流失风险评估助手：逐题收集客户信息、复核修改、提交评分，
//! 并把每次对话保存为可恢复的会话。另支持 CSV 批量评分和 what-if 试算。
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有定时器与存储资源，只暴露能力
//! - `Debouncer` - 防抖调度（schedule / flush / cancel）
//! - `KeyValueStore` - 键值存储端口（内存 / 文件）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `Scorer` / `HealthCheck` - 评分与健康检查接口
//! - `HttpScorer` / `DemoScorer` / `FallbackScorer` - 评分实现
//! - `SessionStore` - 有容量上限、按最近更新排序的会话存储
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次对话"的完整流程
//! - `reduce` - 纯函数状态机
//! - `FlowController` - 预测节奏、自动保存
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_runner` - 限并发调度器
//! - `orchestrator/batch_processor` - CSV 批量评分
//! - `orchestrator/rescorer` - what-if 增量重算
//! - `orchestrator/app` - 程序入口
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{Debouncer, FileStore, KeyValueStore, MemoryStore};
pub use models::{AnswerSet, ConversationState, Prediction, Session, StepKey};
pub use orchestrator::{App, BatchProcessor, BatchRunner, IncrementalRescorer};
pub use services::{DemoScorer, FallbackScorer, HttpScorer, Scorer, SessionStore};
pub use workflow::{reduce, Action, FlowController};
