//! 防抖器 - 基础设施层
//!
//! 把“延迟执行、重复调度时重新计时”的定时器封装成独立对象，
//! 对外只暴露 `schedule` / `flush` / `cancel` 三个能力。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

type Callback<A> = Arc<dyn Fn(A) + Send + Sync>;

struct Pending<A> {
    args: Option<A>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// 防抖器
///
/// 职责：
/// - `schedule(args)`：记录最新参数并重新计时，静默 `delay` 后执行回调
/// - `flush()`：立即同步执行尚未执行的调用
/// - `cancel()`：丢弃尚未执行的调用
///
/// `schedule` 会在当前 tokio 运行时上启动计时任务，必须在运行时内调用。
pub struct Debouncer<A> {
    delay: Duration,
    pending: Arc<Mutex<Pending<A>>>,
    callback: Callback<A>,
}

impl<A: Send + 'static> Debouncer<A> {
    /// 创建新的防抖器
    pub fn new(delay: Duration, callback: impl Fn(A) + Send + Sync + 'static) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(Pending {
                args: None,
                generation: 0,
                timer: None,
            })),
            callback: Arc::new(callback),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 调度一次调用；已有的未执行调用被替换并重新计时
    pub fn schedule(&self, args: A) {
        let mut pending = lock(&self.pending);
        pending.args = Some(args);
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }

        let generation = pending.generation;
        let delay = self.delay;
        let shared = Arc::clone(&self.pending);
        let callback = Arc::clone(&self.callback);

        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let args = {
                let mut pending = lock(&shared);
                if pending.generation != generation {
                    return;
                }
                pending.timer = None;
                pending.args.take()
            };
            if let Some(args) = args {
                callback(args);
            }
        }));
    }

    /// 立即执行尚未执行的调用
    ///
    /// # 返回
    /// 有待执行的调用并已执行时返回 `true`
    pub fn flush(&self) -> bool {
        let args = {
            let mut pending = lock(&self.pending);
            pending.generation += 1;
            if let Some(timer) = pending.timer.take() {
                timer.abort();
            }
            pending.args.take()
        };

        match args {
            Some(args) => {
                debug!("防抖器 flush: 立即执行挂起的调用");
                (self.callback)(args);
                true
            }
            None => false,
        }
    }

    /// 丢弃尚未执行的调用
    pub fn cancel(&self) {
        let mut pending = lock(&self.pending);
        pending.generation += 1;
        pending.args = None;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
    }

    /// 是否有尚未执行的调用
    pub fn is_pending(&self) -> bool {
        lock(&self.pending).args.is_some()
    }
}

impl<A> Drop for Debouncer<A> {
    /// 丢弃防抖器时取消计时任务，挂起的调用不再执行
    fn drop(&mut self) {
        let mut pending = lock(&self.pending);
        pending.generation += 1;
        pending.args = None;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
    }
}

fn lock<A>(pending: &Mutex<Pending<A>>) -> MutexGuard<'_, Pending<A>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
