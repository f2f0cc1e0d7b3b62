//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：输出启动信息，创建评分器并探测后端，之后定期重新探测
//! 2. **模式选择**：配置了 `batch_csv_path` 时批量评分，否则进入终端对话
//! 3. **资源管理**：持有会话存储与对话控制器，退出前 flush 挂起的保存
//!
//! 对话模式下的命令：
//!
//! | 输入 | 作用 |
//! |------|------|
//! | 任意文本 | 回答当前问题 / 提交正在编辑的字段 |
//! | `edit <field>` | 复核阶段编辑字段 |
//! | `cancel` | 放弃编辑 |
//! | `predict` | 提交评分 |
//! | `whatif <field> <value>` | 预测完成后试算修改某个字段的效果 |
//! | `reset` | 重新填写 |
//! | `tab <profile\|insights\|whatif>` | 切换右侧面板（随会话保存） |
//! | `new` / `sessions` / `open <id>` / `delete <id>` / `export <id>` | 会话管理 |
//! | `quit` | 退出 |

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::infrastructure::FileStore;
use crate::models::{load_csv, Message, MessageKind, Role, Status, StepKey};
use crate::orchestrator::batch_processor::{print_final_stats, write_results_csv, BatchProcessor};
use crate::orchestrator::rescorer::IncrementalRescorer;
use crate::services::{FallbackScorer, HttpScorer, Scorer, SessionStore};
use crate::utils::logging::{log_startup, truncate_text};
use crate::workflow::{Action, FlowController, RIGHT_TABS};

const BATCH_OFFLINE: &str = "Backend offline. Enable demo mode (DEMO_MODE=true) to continue.";

/// 应用主结构
pub struct App {
    config: Config,
    scorer: Arc<FallbackScorer>,
    health_poll: JoinHandle<()>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let http = Arc::new(HttpScorer::new(&config)?);
        let scorer = Arc::new(FallbackScorer::new(http.clone(), config.demo_mode));
        if !scorer.refresh(http.as_ref()).await && !config.demo_mode {
            warn!("⚠️ 评分后端不可用: {}，将使用演示评分", config.api_base_url);
        }
        let period = Duration::from_secs(config.health_poll_secs.max(1));
        let health_poll = scorer.spawn_health_poll(http, period);

        Ok(Self {
            config,
            scorer,
            health_poll,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        match &self.config.batch_csv_path {
            Some(path) => self.run_batch(Path::new(path)).await,
            None => self.run_chat().await,
        }
    }

    // ========== 批量模式 ==========

    async fn run_batch(&self, csv_path: &Path) -> Result<()> {
        if !self.scorer.is_live() && !self.config.demo_mode {
            bail!(BATCH_OFFLINE);
        }

        info!("\n📁 正在加载 {}", csv_path.display());
        let table = load_csv(csv_path).await?;

        let processor = BatchProcessor::new(self.scorer.clone(), self.config.batch_concurrency);
        let cancel = processor.cancel_token();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("⏹️ 收到 Ctrl-C，等待进行中的请求结束");
                cancel.cancel();
            }
        });

        let report = processor.score_table(table).await;
        ctrl_c.abort();
        let report = report?;

        let output = &self.config.batch_output_path;
        write_results_csv(Path::new(output), &report).await?;
        print_final_stats(&report, output);
        Ok(())
    }

    // ========== 对话模式 ==========

    async fn run_chat(&self) -> Result<()> {
        let storage = FileStore::new(&self.config.storage_dir)
            .with_context(|| format!("无法打开会话目录: {}", self.config.storage_dir))?;
        let store = SessionStore::new(Arc::new(storage));

        let scorer: Arc<dyn Scorer> = self.scorer.clone();
        let mut flow = FlowController::new(
            scorer.clone(),
            Duration::from_millis(self.config.predict_delay_ms),
        )
        .with_persistence(
            store.clone(),
            Duration::from_millis(self.config.autosave_debounce_ms),
        );

        let resumed = match store.active_session_id() {
            Some(id) => flow.open_session(&id)?,
            None => false,
        };
        if !resumed {
            flow.new_session()?;
        }
        info!("💬 当前会话: {}", flow.session_id().unwrap_or("-"));

        let mut chat = ChatLoop {
            flow,
            store,
            scorer,
            what_if: None,
            printed: 0,
            rescore_delay: Duration::from_millis(self.config.rescore_debounce_ms),
        };
        chat.reprint();
        chat.print_new_messages();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "quit" | "exit") {
                break;
            }
            chat.handle(line).await?;
        }

        chat.flow.flush();
        info!("👋 已保存会话，程序结束");
        Ok(())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.health_poll.abort();
    }
}

/// 终端对话的运行状态
struct ChatLoop {
    flow: FlowController,
    store: SessionStore,
    scorer: Arc<dyn Scorer>,
    what_if: Option<IncrementalRescorer>,
    printed: usize,
    rescore_delay: Duration,
}

impl ChatLoop {
    async fn handle(&mut self, line: &str) -> Result<()> {
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "predict" => {
                println!("… scoring");
                self.flow.confirm_predict().await;
                self.refresh_what_if();
            }
            "edit" => match rest.parse::<StepKey>() {
                Ok(step) => {
                    self.flow.dispatch(Action::StartEdit { step });
                }
                Err(e) => println!("⚠️ {} ({})", e, field_names()),
            },
            "cancel" => {
                self.flow.dispatch(Action::CancelEdit);
                self.print_review();
                return Ok(());
            }
            "reset" => {
                self.flow.dispatch(Action::ResetFlow);
                self.reprint();
            }
            "whatif" => self.run_what_if(rest).await,
            "tab" => {
                if self.flow.set_right_tab(rest) {
                    self.print_panel();
                } else {
                    println!("⚠️ Unknown or unavailable tab ({})", RIGHT_TABS.join(", "));
                }
            }
            "new" => {
                self.flow.new_session()?;
                self.reprint();
            }
            "sessions" => self.list_sessions(),
            "open" => {
                if self.flow.open_session(rest)? {
                    self.reprint();
                } else {
                    println!("⚠️ No session {}", rest);
                }
            }
            "delete" => {
                let was_current = self.flow.session_id() == Some(rest);
                if !self.flow.delete_session(rest)? {
                    println!("⚠️ No session {}", rest);
                } else if was_current {
                    // 切到最近的会话，没有则新建
                    let fallback = self.store.list().into_iter().next().map(|s| s.id);
                    let reopened = match fallback {
                        Some(id) => self.flow.open_session(&id)?,
                        None => false,
                    };
                    if !reopened {
                        self.flow.new_session()?;
                    }
                    self.reprint();
                }
            }
            "export" => match self.store.export(rest)? {
                Some(json) => println!("{}", json),
                None => println!("⚠️ No session {}", rest),
            },
            _ => {
                if !self.flow.submit(line) {
                    println!("Type 'predict', 'edit <field>' or 'reset'.");
                }
            }
        }

        self.print_new_messages();
        Ok(())
    }

    /// 只有拿到预测结果后才能试算
    fn refresh_what_if(&mut self) {
        let state = self.flow.state();
        self.what_if = match state.status {
            Status::Done => Some(IncrementalRescorer::new(
                self.scorer.clone(),
                state.answers.clone(),
                state.prediction.clone(),
                self.rescore_delay,
            )),
            _ => None,
        };
    }

    async fn run_what_if(&self, args: &str) {
        let Some(what_if) = &self.what_if else {
            println!("Run a prediction first.");
            return;
        };
        if args == "reset" {
            what_if.reset_to_baseline();
            println!("What-if reset to current answers.");
            return;
        }

        let (field, value) = args.split_once(' ').unwrap_or((args, ""));
        let step = match field.parse::<StepKey>() {
            Ok(step) => step,
            Err(e) => {
                println!("⚠️ {} ({})", e, field_names());
                return;
            }
        };

        what_if.edit_field(step, value);
        if let Some(err) = what_if.field_error(step) {
            println!("⚠️ {}", err);
            return;
        }
        what_if.recompute_now().await;

        let snapshot = what_if.snapshot();
        if let Some(err) = &snapshot.error {
            println!("⚠️ {}", err);
        }
        if let Some(result) = &snapshot.result {
            let delta = what_if.delta_pct_points().unwrap_or(0);
            println!("What-if: {} ({:+} pts vs. current)", result.summary(), delta);
        }
    }

    /// 打印当前右侧面板
    fn print_panel(&self) {
        let state = self.flow.state();
        match self.flow.ui().right_tab.as_str() {
            "insights" => match &state.prediction {
                Some(prediction) => {
                    println!("   {}", prediction.summary());
                    for e in &prediction.explanation {
                        println!("   • {}: {}", e.feature, e.reason);
                    }
                }
                None => println!("   No prediction yet."),
            },
            "whatif" => println!("   whatif <field> <value> | whatif reset"),
            _ => {
                for (step, value) in &state.answers {
                    println!("   {:<18} {}", step.short_label(), value);
                }
            }
        }
    }

    fn list_sessions(&self) {
        let current = self.flow.session_id();
        for session in self.store.list() {
            let marker = if Some(session.id.as_str()) == current { "*" } else { " " };
            println!(
                "{} {}  {}  {}",
                marker,
                session.id,
                session.updated_at.format("%Y-%m-%d %H:%M"),
                truncate_text(&session.title, 40)
            );
        }
    }

    fn reprint(&mut self) {
        self.printed = 0;
        self.refresh_what_if();
    }

    fn print_new_messages(&mut self) {
        let state = self.flow.state();
        let before = self.printed;
        for message in state.messages.iter().skip(before) {
            print_message(message);
        }
        self.printed = state.messages.len();

        if let Some(step) = state.active_step() {
            let options = step.options();
            if !options.is_empty() {
                println!("   options: {}", options.join(" | "));
            }
        }
        if self.printed > before {
            self.print_review();
        }
    }

    fn print_review(&self) {
        let state = self.flow.state();
        if state.status != Status::Review {
            return;
        }
        for (step, value) in &state.answers {
            println!("   {:<18} {}", step.short_label(), value);
        }
        println!("   (predict | edit <field>)");
    }
}

fn print_message(message: &Message) {
    match (message.role, message.kind) {
        (_, MessageKind::Result) => {
            if let Some(prediction) = &message.payload {
                for e in &prediction.explanation {
                    println!("   • {}: {}", e.feature, e.reason);
                }
            }
        }
        (_, MessageKind::Error) => println!("⚠️ {}", message.text()),
        (Role::User, _) => println!("> {}", message.text()),
        (Role::Assistant, _) => println!("🤖 {}", message.text()),
    }
}

fn field_names() -> String {
    crate::models::STEPS
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
