//! 基础设施层（Infrastructure）
//!
//! 持有定时器与存储这类资源，只暴露能力，不认识会话或对话流程。

pub mod debouncer;
pub mod storage;

pub use debouncer::Debouncer;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
