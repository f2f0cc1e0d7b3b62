//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责并发调度和程序生命周期，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_runner` - 限并发调度器
//! - 连续补位，最多 C 个任务同时进行
//! - 协作式取消，完成回调恰好一次
//!
//! ### `batch_processor` - 批量评分处理器
//! - 逐行校验 CSV，只调度合法行
//! - 结果按原始行号归位，输出统计和结果 CSV
//!
//! ### `rescorer` - what-if 增量重算
//! - 防抖、按值去重、丢弃过期响应
//!
//! ### `app` - 应用入口
//! - 批量模式 / 终端对话模式
//!
//! ## 层次关系
//!
//! ```text
//! app
//!  ├─ batch_processor → batch_runner
//!  ├─ rescorer
//!  └─ workflow::FlowController
//!         ↓
//! services (能力层：scorer / session_store)
//!         ↓
//! infrastructure (基础设施：debouncer / storage)
//! ```

pub mod app;
pub mod batch_processor;
pub mod batch_runner;
pub mod rescorer;

// 重新导出主要类型
pub use app::App;
pub use batch_processor::{BatchProcessor, BatchReport, BatchRow, BatchSummary, RiskBucket, RowOutcome};
pub use batch_runner::{BatchObserver, BatchRunner, BatchStatus, Progress};
pub use rescorer::{IncrementalRescorer, RecomputeOutcome, RescoreStatus, WhatIfSnapshot};
