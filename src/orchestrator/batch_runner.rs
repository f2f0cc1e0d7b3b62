//! 限并发任务调度器 - 编排层
//!
//! ## 职责
//!
//! 驱动一批互不相关的异步任务（通常是评分调用）：
//!
//! - 同一时刻最多 `concurrency` 个任务未完成
//! - 任意任务结束后立即补入下一个（连续补位，不按轮次）
//! - 每结束一个任务报告一次进度 `{processed, total}`
//! - 单个任务失败只影响自己，结果按原始下标回调
//! - 取消是协作式的：只停止补位，不中断已在执行的任务
//! - 完成回调恰好触发一次
//!
//! 所有任务都在调用者的任务里通过 [`FuturesUnordered`] 轮询，不额外 spawn。

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// 进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

/// 批次结束状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    Cancelled,
}

/// 批次回调
///
/// 所有回调都在 [`BatchRunner::run`] 所在的任务中顺序调用。
pub trait BatchObserver<T> {
    fn on_progress(&mut self, _progress: Progress) {}

    fn on_result(&mut self, _index: usize, _result: T) {}

    fn on_error(&mut self, _index: usize, _error: &AppError) {}

    fn on_done(&mut self, _status: BatchStatus) {}
}

/// 限并发调度器
#[derive(Debug, Clone)]
pub struct BatchRunner {
    concurrency: usize,
    cancel: CancellationToken,
}

impl BatchRunner {
    /// 创建调度器，并发数至少为 1
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 共享的取消令牌，可交给其他任务或回调使用
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 请求取消：不再补入新任务
    pub fn cancel(&self) {
        info!("⏹️ 收到取消请求，停止补入新任务");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 运行一批任务
    ///
    /// # 参数
    /// - `jobs`: `(原始下标, 任务输入)` 列表，按顺序补入
    /// - `job_fn`: 把任务输入变成异步调用
    /// - `observer`: 回调
    ///
    /// # 返回
    /// 结束状态（与 `on_done` 收到的一致）
    pub async fn run<J, T, F, Fut, O>(&self, jobs: Vec<(usize, J)>, job_fn: F, observer: &mut O) -> BatchStatus
    where
        F: Fn(J) -> Fut,
        Fut: Future<Output = AppResult<T>>,
        O: BatchObserver<T> + ?Sized,
    {
        let total = jobs.len();
        if total == 0 {
            debug!("空批次，直接结束");
            observer.on_done(BatchStatus::Completed);
            return BatchStatus::Completed;
        }

        let start = |(index, job): (usize, J)| {
            let call = job_fn(job);
            async move { (index, call.await) }
        };

        let mut queue = jobs.into_iter();
        let mut in_flight = FuturesUnordered::new();

        while in_flight.len() < self.concurrency && !self.cancel.is_cancelled() {
            match queue.next() {
                Some(job) => in_flight.push(start(job)),
                None => break,
            }
        }

        let mut processed = 0;
        while let Some((index, outcome)) = in_flight.next().await {
            match outcome {
                Ok(result) => observer.on_result(index, result),
                Err(e) => observer.on_error(index, &e),
            }
            processed += 1;
            observer.on_progress(Progress { processed, total });

            if !self.cancel.is_cancelled() {
                if let Some(job) = queue.next() {
                    in_flight.push(start(job));
                }
            }
        }

        let status = if self.cancel.is_cancelled() {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        };
        debug!("批次结束: {:?}，已处理 {}/{}", status, processed, total);
        observer.on_done(status);
        status
    }
}
