use async_trait::async_trait;
use churn_assist::error::{AppError, AppResult};
use churn_assist::infrastructure::{FileStore, MemoryStore};
use churn_assist::models::{parse_csv, Label, MessageKind, Status, StepKey};
use churn_assist::orchestrator::{
    BatchObserver, BatchProcessor, BatchRunner, BatchStatus, IncrementalRescorer, Progress, RowOutcome,
};
use churn_assist::services::{DemoScorer, SessionStore, MAX_SESSIONS};
use churn_assist::workflow::FlowController;
use churn_assist::{AnswerSet, Prediction, Scorer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

const SCENARIO_A: [&str; 6] = ["40", "24", "70", "Month-to-month", "DSL", "5"];

/// 固定返回 CHURN 62% 的评分器
#[derive(Default)]
struct FixedScorer {
    calls: AtomicUsize,
}

#[async_trait]
impl Scorer for FixedScorer {
    async fn score(&self, _answers: &AnswerSet) -> AppResult<Prediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Prediction::new(Label::Churn, 0.62))
    }
}

#[tokio::test(start_paused = true)]
async fn conversation_is_scored_and_resumable() {
    let store = SessionStore::new(Arc::new(MemoryStore::new()));
    let scorer = Arc::new(FixedScorer::default());

    let session_id = {
        let mut flow = FlowController::new(scorer.clone(), Duration::from_millis(500))
            .with_persistence(store.clone(), Duration::from_millis(500));
        let session = flow.new_session().unwrap().unwrap();

        for raw in SCENARIO_A {
            flow.submit(raw);
        }
        assert_eq!(flow.state().status, Status::Review);

        let state = flow.confirm_predict().await;
        assert_eq!(state.status, Status::Done);
        let results = state
            .messages
            .iter()
            .filter(|m| m.kind == MessageKind::Result)
            .count();
        assert_eq!(results, 1);
        session.id
        // 控制器析构时写入挂起的保存
    };

    assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);
    let saved = store.get(&session_id).unwrap();
    assert_eq!(saved.status, Status::Done);
    assert!(saved.title.starts_with("Churn: 62% ("));

    let mut resumed = FlowController::new(scorer, Duration::ZERO)
        .with_persistence(store.clone(), Duration::from_millis(500));
    assert!(resumed.open_session(&session_id).unwrap());
    assert_eq!(resumed.state().status, Status::Done);
    assert_eq!(resumed.state().prediction.as_ref().map(|p| p.score), Some(0.62));
    assert_eq!(store.active_session_id(), Some(session_id));
}

#[test]
fn thirty_first_session_evicts_least_recently_updated() {
    let store = SessionStore::new(Arc::new(MemoryStore::new()));
    let first = assert_ok!(store.create(None));
    for _ in 1..MAX_SESSIONS {
        assert_ok!(store.create(None));
    }
    assert_eq!(store.list().len(), MAX_SESSIONS);
    assert!(store.get(&first.id).is_some());

    assert_ok!(store.create(None));
    assert_eq!(store.list().len(), MAX_SESSIONS);
    assert!(store.get(&first.id).is_none());
}

#[test]
fn sessions_survive_on_disk() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let store = SessionStore::new(Arc::new(assert_ok!(FileStore::new(dir.path()))));
        let session = assert_ok!(store.create(None));
        assert_ok!(store.rename(&session.id, "Acme renewal"));
        assert_ok!(store.set_active_session_id(Some(&session.id)));
        session.id
    };

    let reopened = SessionStore::new(Arc::new(assert_ok!(FileStore::new(dir.path()))));
    assert_eq!(reopened.get(&id).map(|s| s.title), Some("Acme renewal".to_string()));
    assert_eq!(reopened.active_session_id(), Some(id));
}

#[tokio::test]
async fn scenario_b_batch_with_demo_scorer() {
    let table = parse_csv(
        "age,tenure,monthlyCharges,contract,internetService,paymentDelay\n\
         -5,24,70,Month-to-month,DSL,5\n\
         40,24,70,Month-to-month,DSL,5\n",
    );
    let processor = BatchProcessor::new(Arc::new(DemoScorer::new()), 3);
    let report = assert_ok!(processor.score_table(table).await);

    assert_eq!(report.rows.len(), 2);
    assert!(matches!(
        report.rows[0].outcome,
        Some(RowOutcome::ValidationError { .. })
    ));
    assert!(matches!(
        report.rows[1].outcome,
        Some(RowOutcome::Success { label: Label::Churn, .. })
    ));
    assert_eq!(report.status, BatchStatus::Completed);
}

#[derive(Default)]
struct Events {
    progress: usize,
    done: usize,
}

impl BatchObserver<()> for Events {
    fn on_progress(&mut self, _progress: Progress) {
        self.progress += 1;
    }

    fn on_done(&mut self, _status: BatchStatus) {
        self.done += 1;
    }
}

#[tokio::test]
async fn scenario_c_empty_batch_completes_immediately() {
    let runner = BatchRunner::new(3);
    let mut events = Events::default();

    let status = runner
        .run(Vec::<(usize, ())>::new(), |_| async { Ok::<(), AppError>(()) }, &mut events)
        .await;

    assert_eq!(status, BatchStatus::Completed);
    assert_eq!(events.progress, 0);
    assert_eq!(events.done, 1);
}

#[tokio::test(start_paused = true)]
async fn what_if_contract_change_lowers_demo_risk() {
    let scorer = DemoScorer::new();
    let baseline = AnswerSet {
        age: 40,
        tenure: 24,
        monthly_charges: 70.0,
        contract: "Month-to-month".into(),
        internet_service: "DSL".into(),
        payment_delay: 5,
    };
    let base_prediction = scorer.predict(&baseline);
    assert_eq!(base_prediction.risk_pct(), 50);

    let what_if = IncrementalRescorer::new(
        Arc::new(scorer),
        baseline.to_answers(),
        Some(base_prediction),
        Duration::from_millis(400),
    );
    what_if.edit_field(StepKey::Contract, "Two year");
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(what_if.delta_pct_points(), Some(-20));
    assert_eq!(
        what_if.snapshot().result.map(|p| p.label),
        Some(Label::NoChurn)
    );
}
