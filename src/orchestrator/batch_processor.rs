//! 批量评分处理器 - 编排层
//!
//! ## 职责
//!
//! 1. **表头检查**：六个字段缺一不可
//! 2. **逐行校验**：与对话流程共用同一套校验规则，第一个不合法的字段即为该行的错误
//! 3. **并发评分**：只把合法的行交给 [`BatchRunner`]
//! 4. **结果归位**：无论完成顺序如何，结果都按原始行号存放
//! 5. **统计输出**：成功 / 校验失败 / 请求失败 / 未执行，以及平均分
//!
//! 取消后尚未执行的行保持 `outcome = None`。

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::models::{validate_answer, AnswerSet, Answers, CsvRow, CsvTable, Label, Prediction, STEPS};
use crate::orchestrator::batch_runner::{BatchObserver, BatchRunner, BatchStatus, Progress};
use crate::services::Scorer;

/// 单行结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RowOutcome {
    Success { label: Label, score: f64 },
    TransportError { message: String },
    ValidationError { message: String },
}

/// 一行输入及其结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRow {
    pub row_index: usize,
    pub input_fields: CsvRow,
    /// `None` 表示批次被取消，该行未执行
    pub outcome: Option<RowOutcome>,
}

/// 风险分档
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBucket {
    Low,
    Medium,
    High,
}

impl RiskBucket {
    /// `< 0.35` 为低，`<= 0.65` 为中，其余为高
    pub fn from_score(score: f64) -> Option<Self> {
        if score.is_nan() {
            return None;
        }
        Some(if score < 0.35 {
            RiskBucket::Low
        } else if score <= 0.65 {
            RiskBucket::Medium
        } else {
            RiskBucket::High
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskBucket::Low => "Low",
            RiskBucket::Medium => "Medium",
            RiskBucket::High => "High",
        }
    }
}

/// 批次统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub validation_failed: usize,
    pub transport_failed: usize,
    pub not_run: usize,
    pub mean_score: Option<f64>,
}

impl BatchSummary {
    fn from_rows(rows: &[BatchRow]) -> Self {
        let mut summary = BatchSummary {
            total: rows.len(),
            ..Default::default()
        };
        let mut score_sum = 0.0;

        for row in rows {
            match &row.outcome {
                Some(RowOutcome::Success { score, .. }) => {
                    summary.success += 1;
                    score_sum += score;
                }
                Some(RowOutcome::TransportError { .. }) => summary.transport_failed += 1,
                Some(RowOutcome::ValidationError { .. }) => summary.validation_failed += 1,
                None => summary.not_run += 1,
            }
        }

        if summary.success > 0 {
            summary.mean_score = Some(score_sum / summary.success as f64);
        }
        summary
    }
}

/// 批次报告
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub headers: Vec<String>,
    pub rows: Vec<BatchRow>,
    pub status: BatchStatus,
    pub summary: BatchSummary,
}

/// 批量评分处理器
pub struct BatchProcessor {
    scorer: Arc<dyn Scorer>,
    runner: BatchRunner,
}

impl BatchProcessor {
    /// 创建处理器
    ///
    /// # 参数
    /// - `scorer`: 评分器
    /// - `concurrency`: 最大并发请求数
    pub fn new(scorer: Arc<dyn Scorer>, concurrency: usize) -> Self {
        Self {
            scorer,
            runner: BatchRunner::new(concurrency),
        }
    }

    /// 取消令牌；取消后不再发出新的请求
    pub fn cancel_token(&self) -> CancellationToken {
        self.runner.cancel_token()
    }

    /// 检查表头后评分整张表
    pub async fn score_table(&self, table: CsvTable) -> Result<BatchReport> {
        let missing = missing_columns(&table.headers);
        if !missing.is_empty() {
            bail!("Missing columns: {}", missing.join(", "));
        }

        let (rows, status) = self.score_rows(table.rows).await;
        Ok(BatchReport {
            headers: table.headers,
            summary: BatchSummary::from_rows(&rows),
            rows,
            status,
        })
    }

    /// 评分若干行
    ///
    /// # 返回
    /// 与输入等长、按原始行号排列的结果，以及批次结束状态
    pub async fn score_rows(&self, rows: Vec<CsvRow>) -> (Vec<BatchRow>, BatchStatus) {
        let start_time = Instant::now();
        let mut collector = Collector {
            rows: Vec::with_capacity(rows.len()),
        };
        let mut jobs = Vec::new();

        for (row_index, input_fields) in rows.into_iter().enumerate() {
            let outcome = match validate_row(&input_fields) {
                Ok(answers) => {
                    jobs.push((row_index, answers));
                    None
                }
                Err(message) => {
                    debug!("[行 {}] 校验失败: {}", row_index + 1, message);
                    Some(RowOutcome::ValidationError { message })
                }
            };
            collector.rows.push(BatchRow {
                row_index,
                input_fields,
                outcome,
            });
        }

        log_batch_start(collector.rows.len(), jobs.len(), self.runner.concurrency());

        let scorer = &self.scorer;
        let status = self
            .runner
            .run(
                jobs,
                |answers: AnswerSet| async move { scorer.score(&answers).await },
                &mut collector,
            )
            .await;

        info!("⏱️ 批次耗时 {:.1}s", start_time.elapsed().as_secs_f64());
        (collector.rows, status)
    }
}

/// 收集回调结果，按原始行号写入
struct Collector {
    rows: Vec<BatchRow>,
}

impl Collector {
    fn set(&mut self, index: usize, outcome: RowOutcome) {
        if let Some(row) = self.rows.get_mut(index) {
            row.outcome = Some(outcome);
        }
    }
}

impl BatchObserver<Prediction> for Collector {
    fn on_progress(&mut self, progress: Progress) {
        debug!("📈 进度 {}/{}", progress.processed, progress.total);
    }

    fn on_result(&mut self, index: usize, result: Prediction) {
        debug!("[行 {}] ✓ {}", index + 1, result.summary());
        self.set(
            index,
            RowOutcome::Success {
                label: result.label,
                score: result.score,
            },
        );
    }

    fn on_error(&mut self, index: usize, err: &AppError) {
        error!("[行 {}] ❌ 评分失败: {}", index + 1, err);
        self.set(
            index,
            RowOutcome::TransportError {
                message: err.user_message(),
            },
        );
    }

    fn on_done(&mut self, status: BatchStatus) {
        if status == BatchStatus::Cancelled {
            warn!("⚠️ 批次已取消，未执行的行保持空白");
        }
    }
}

/// 缺失的必需列
pub fn missing_columns(headers: &[String]) -> Vec<&'static str> {
    STEPS
        .iter()
        .map(|k| k.as_str())
        .filter(|name| !headers.iter().any(|h| h == name))
        .collect()
}

/// 校验一行；错误信息形如 `age: Must be at least 0.`
pub fn validate_row(row: &CsvRow) -> std::result::Result<AnswerSet, String> {
    let mut answers = Answers::new();
    for step in STEPS {
        let raw = row.get(step.as_str()).map(String::as_str).unwrap_or("");
        let value = validate_answer(step, raw).map_err(|e| format!("{}: {}", step, e))?;
        answers.insert(step, value);
    }
    AnswerSet::from_answers(&answers).map_err(|(step, e)| format!("{}: {}", step, e))
}

// ========== 结果输出 ==========

/// 生成结果 CSV：原始列 + label / score / risk / status / error
pub fn render_results_csv(report: &BatchReport) -> String {
    let mut header: Vec<String> = report.headers.clone();
    header.extend(["label", "score", "risk", "status", "error"].map(String::from));

    let mut out = String::new();
    push_record(&mut out, header.iter().map(String::as_str));

    for row in &report.rows {
        let mut fields: Vec<String> = report
            .headers
            .iter()
            .map(|h| row.input_fields.get(h).cloned().unwrap_or_default())
            .collect();

        let (label, score, risk, status, error) = match &row.outcome {
            Some(RowOutcome::Success { label, score }) => (
                label.to_string(),
                format!("{:.4}", score),
                RiskBucket::from_score(*score)
                    .map(|b| b.as_str().to_string())
                    .unwrap_or_default(),
                "success",
                String::new(),
            ),
            Some(RowOutcome::TransportError { message }) => {
                (String::new(), String::new(), String::new(), "error", message.clone())
            }
            Some(RowOutcome::ValidationError { message }) => {
                (String::new(), String::new(), String::new(), "validation", message.clone())
            }
            None => (String::new(), String::new(), String::new(), "pending", String::new()),
        };
        fields.extend([label, score, risk, status.to_string(), error]);
        push_record(&mut out, fields.iter().map(String::as_str));
    }
    out
}

/// 写出结果 CSV
pub async fn write_results_csv(path: &Path, report: &BatchReport) -> Result<()> {
    tokio::fs::write(path, render_results_csv(report))
        .await
        .with_context(|| format!("无法写入结果文件: {}", path.display()))?;
    info!("💾 结果已写入 {}", path.display());
    Ok(())
}

fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let line: Vec<String> = fields.map(escape_field).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// ========== 日志辅助函数 ==========

fn log_batch_start(total: usize, valid: usize, concurrency: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始批量评分: 共 {} 行，合法 {} 行", total, valid);
    info!("📊 最大并发数: {}", concurrency);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(report: &BatchReport, output_path: &str) {
    let s = &report.summary;
    info!("\n{}", "=".repeat(60));
    info!(
        "📊 批量评分{}",
        match report.status {
            BatchStatus::Completed => "完成",
            BatchStatus::Cancelled => "已取消",
        }
    );
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", s.success, s.total);
    info!("📝 校验失败: {}", s.validation_failed);
    info!("❌ 请求失败: {}", s.transport_failed);
    if s.not_run > 0 {
        info!("⏸️ 未执行: {}", s.not_run);
    }
    if let Some(mean) = s.mean_score {
        info!("📈 平均风险: {:.1}%", mean * 100.0);
    }
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", output_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::models::parse_csv;
    use async_trait::async_trait;
    use std::time::Duration;

    /// 按年龄决定耗时，使完成顺序与行号相反
    struct SlowByAge;

    #[async_trait]
    impl Scorer for SlowByAge {
        async fn score(&self, answers: &AnswerSet) -> AppResult<Prediction> {
            tokio::time::sleep(Duration::from_millis(1000 - answers.age as u64 * 5)).await;
            if answers.payment_delay == 60 {
                return Err(AppError::bad_response("/api/predict", 500, None));
            }
            Ok(Prediction::new(Label::NoChurn, 0.2))
        }
    }

    fn processor() -> BatchProcessor {
        BatchProcessor::new(Arc::new(SlowByAge), 3)
    }

    const HEADER: &str = "age,tenure,monthlyCharges,contract,internetService,paymentDelay";

    #[tokio::test(start_paused = true)]
    async fn scenario_b_keeps_original_row_order() {
        let table = parse_csv(&format!(
            "{HEADER}\n-5,24,70,Month-to-month,DSL,5\n40,24,70,Month-to-month,DSL,5\n"
        ));
        let report = processor().score_table(table).await.unwrap();

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.status, BatchStatus::Completed);
        assert_eq!(
            report.rows[0].outcome,
            Some(RowOutcome::ValidationError {
                message: "age: Must be at least 0.".into()
            })
        );
        assert!(matches!(
            report.rows[1].outcome,
            Some(RowOutcome::Success { label: Label::NoChurn, .. })
        ));
        assert_eq!(report.summary.validation_failed, 1);
        assert_eq!(report.summary.success, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_completion_lands_in_place() {
        let table = parse_csv(&format!(
            "{HEADER}\n20,1,10,DSL,DSL,0\n30,1,10,One year,DSL,60\n40,1,10,One year,DSL,0\n50,1,10,Two year,None,0\n"
        ));
        let report = processor().score_table(table).await.unwrap();

        let indices: Vec<_> = report.rows.iter().map(|r| r.row_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(
            report.rows[0].outcome,
            Some(RowOutcome::ValidationError {
                message: "contract: Please choose one of the options.".into()
            })
        );
        assert_eq!(
            report.rows[1].outcome,
            Some(RowOutcome::TransportError {
                message: "Request failed: 500".into()
            })
        );
        assert_eq!(report.summary.success, 2);
        assert_eq!(report.summary.mean_score, Some(0.2));
    }

    #[tokio::test]
    async fn missing_columns_are_rejected() {
        let table = parse_csv("age,tenure\n40,24\n");
        let err = processor().score_table(table).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing columns: monthlyCharges, contract, internetService, paymentDelay"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_batch_leaves_rows_pending() {
        let processor = BatchProcessor::new(Arc::new(SlowByAge), 1);
        processor.cancel_token().cancel();
        let table = parse_csv(&format!("{HEADER}\n40,24,70,One year,DSL,5\n"));

        let report = processor.score_table(table).await.unwrap();
        assert_eq!(report.status, BatchStatus::Cancelled);
        assert_eq!(report.rows[0].outcome, None);
        assert_eq!(report.summary.not_run, 1);
    }

    #[test]
    fn results_csv_quotes_fields_and_buckets_risk() {
        let report = BatchReport {
            headers: vec!["age".into(), "contract".into()],
            rows: vec![
                BatchRow {
                    row_index: 0,
                    input_fields: [("age".into(), "40".into()), ("contract".into(), "One year".into())]
                        .into_iter()
                        .collect(),
                    outcome: Some(RowOutcome::Success {
                        label: Label::Churn,
                        score: 0.7,
                    }),
                },
                BatchRow {
                    row_index: 1,
                    input_fields: CsvRow::new(),
                    outcome: Some(RowOutcome::TransportError {
                        message: "oops, \"down\"".into(),
                    }),
                },
            ],
            status: BatchStatus::Completed,
            summary: BatchSummary::default(),
        };

        let csv = render_results_csv(&report);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "age,contract,label,score,risk,status,error");
        assert_eq!(lines[1], "40,One year,CHURN,0.7000,High,success,");
        assert_eq!(lines[2], ",,,,,error,\"oops, \"\"down\"\"\"");
    }

    #[test]
    fn risk_bucket_boundaries() {
        assert_eq!(RiskBucket::from_score(0.34), Some(RiskBucket::Low));
        assert_eq!(RiskBucket::from_score(0.35), Some(RiskBucket::Medium));
        assert_eq!(RiskBucket::from_score(0.65), Some(RiskBucket::Medium));
        assert_eq!(RiskBucket::from_score(0.66), Some(RiskBucket::High));
    }
}
