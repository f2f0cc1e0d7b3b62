//! 在线 / 兜底评分选择 - 业务能力层
//!
//! 健康检查通过且未开启演示模式时走在线评分，否则使用 [`DemoScorer`]。

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::error::AppResult;
use crate::models::{AnswerSet, Prediction};
use crate::services::demo_scorer::DemoScorer;
use crate::services::scorer::{HealthCheck, Scorer};

/// 带兜底的评分器
pub struct FallbackScorer {
    primary: Arc<dyn Scorer>,
    fallback: DemoScorer,
    online: AtomicBool,
    demo_mode: bool,
}

impl FallbackScorer {
    /// 创建评分器，初始视为离线，需调用 [`FallbackScorer::refresh`] 更新状态
    pub fn new(primary: Arc<dyn Scorer>, demo_mode: bool) -> Self {
        Self {
            primary,
            fallback: DemoScorer::new(),
            online: AtomicBool::new(false),
            demo_mode,
        }
    }

    /// 重新探测后端状态
    ///
    /// # 返回
    /// 后端是否在线
    pub async fn refresh(&self, health: &dyn HealthCheck) -> bool {
        let online = health.check().await;
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online != was_online {
            info!(
                "后端状态变化: {}",
                if online { "在线" } else { "离线，改用演示评分" }
            );
        }
        online
    }

    /// 在后台按固定间隔重新探测后端
    ///
    /// 第一次探测在一个间隔之后；调用方负责在退出时 `abort` 返回的任务。
    pub fn spawn_health_poll(
        self: &Arc<Self>,
        health: Arc<dyn HealthCheck>,
        period: Duration,
    ) -> JoinHandle<()> {
        let scorer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let online = scorer.refresh(health.as_ref()).await;
                debug!("健康检查: {}", if online { "在线" } else { "离线" });
            }
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// 当前是否使用在线评分
    pub fn is_live(&self) -> bool {
        !self.demo_mode && self.online.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for FallbackScorer {
    async fn score(&self, answers: &AnswerSet) -> AppResult<Prediction> {
        if !self.is_live() {
            return Ok(self.fallback.predict(answers));
        }
        let mut prediction = self.primary.score(answers).await?;
        prediction.demo = Some(false);
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::Label;
    use tokio_test::assert_ok;

    struct Unreachable;

    #[async_trait]
    impl Scorer for Unreachable {
        async fn score(&self, _: &AnswerSet) -> AppResult<Prediction> {
            Err(AppError::rejected("backend down"))
        }
    }

    struct FixedHealth(bool);

    #[async_trait]
    impl HealthCheck for FixedHealth {
        async fn check(&self) -> bool {
            self.0
        }
    }

    /// 可随时切换结果的健康检查
    #[derive(Default)]
    struct Switch(AtomicBool);

    #[async_trait]
    impl HealthCheck for Switch {
        async fn check(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct Fixed;

    #[async_trait]
    impl Scorer for Fixed {
        async fn score(&self, _: &AnswerSet) -> AppResult<Prediction> {
            Ok(Prediction::new(Label::Churn, 0.9))
        }
    }

    fn answers() -> AnswerSet {
        AnswerSet {
            age: 30,
            tenure: 12,
            monthly_charges: 50.5,
            contract: "Two year".into(),
            internet_service: "None".into(),
            payment_delay: 0,
        }
    }

    #[tokio::test]
    async fn offline_uses_demo_scoring() {
        let scorer = FallbackScorer::new(Arc::new(Unreachable), false);
        assert!(!scorer.refresh(&FixedHealth(false)).await);

        let p = assert_ok!(scorer.score(&answers()).await);
        assert_eq!(p.demo, Some(true));
    }

    #[tokio::test]
    async fn online_uses_primary_and_marks_live() {
        let scorer = FallbackScorer::new(Arc::new(Fixed), false);
        assert!(scorer.refresh(&FixedHealth(true)).await);

        let p = assert_ok!(scorer.score(&answers()).await);
        assert_eq!(p.label, Label::Churn);
        assert_eq!(p.demo, Some(false));
    }

    #[tokio::test]
    async fn demo_mode_overrides_health() {
        let scorer = FallbackScorer::new(Arc::new(Unreachable), true);
        scorer.set_online(true);
        assert!(!scorer.is_live());
        assert_ok!(scorer.score(&answers()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_follows_backend_until_aborted() {
        let scorer = Arc::new(FallbackScorer::new(Arc::new(Fixed), false));
        let health = Arc::new(Switch::default());
        let poll = scorer.spawn_health_poll(health.clone(), Duration::from_secs(10));

        // 后端稍后才上线
        health.0.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!scorer.is_live());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(scorer.is_live());

        // 后端下线后退回演示评分
        health.0.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!scorer.is_live());
        let p = assert_ok!(scorer.score(&answers()).await);
        assert_eq!(p.demo, Some(true));

        poll.abort();
        health.0.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!scorer.is_live());
    }
}
