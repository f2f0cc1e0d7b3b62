//! 业务能力层（Services）
//!
//! 描述“我能做什么”：评分、健康检查、会话持久化。不关心对话流程顺序。

pub mod demo_scorer;
pub mod fallback_scorer;
pub mod http_scorer;
pub mod scorer;
pub mod session_store;

pub use demo_scorer::DemoScorer;
pub use fallback_scorer::FallbackScorer;
pub use http_scorer::HttpScorer;
pub use scorer::{HealthCheck, Scorer};
pub use session_store::{restore_recency_order, SessionStore, MAX_SESSIONS};
