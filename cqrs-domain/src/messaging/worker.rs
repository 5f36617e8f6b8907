//! 后台工作单元（Worker / WorkerPool）
//!
//! 一个 Worker 是一段具名的长驻循环：取数（supply）→ 处理（process）→ 回调 → 可选休眠。
//! - 处理失败与 panic 都被隔离在单次迭代内，通过 `on_failure` 报告，循环继续；
//! - `stop` 只在取数或休眠时打断循环，正在进行的处理总会执行完毕；
//! - 状态只会 `Created → Running → Stopped`，没有暂停。
//!
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type SupplyFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Option<T>> + Send + Sync>;
type ProcessFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type SuccessFn = Arc<dyn Fn(&str) + Send + Sync>;
type FailureFn = Arc<dyn Fn(&str, &anyhow::Error) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Stopped,
}

/// 工作单元定义，可被多个 Worker 共享
pub struct WorkerDefinition<T> {
    supply: SupplyFn<T>,
    process: ProcessFn<T>,
    on_success: Option<SuccessFn>,
    on_failure: Option<FailureFn>,
    interval: Duration,
}

impl<T> Clone for WorkerDefinition<T> {
    fn clone(&self) -> Self {
        Self {
            supply: self.supply.clone(),
            process: self.process.clone(),
            on_success: self.on_success.clone(),
            on_failure: self.on_failure.clone(),
            interval: self.interval,
        }
    }
}

impl WorkerDefinition<()> {
    /// 循环执行无参动作
    pub fn from_action<F, Fut>(action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_supplier(|| async { Some(()) }, move |()| action())
    }
}

impl<T: Send + 'static> WorkerDefinition<T> {
    /// 取数 + 处理；`supply` 返回 `None` 表示数据源已耗尽，循环结束
    pub fn from_supplier<S, SFut, P, PFut>(supply: S, process: P) -> Self
    where
        S: Fn() -> SFut + Send + Sync + 'static,
        SFut: Future<Output = Option<T>> + Send + 'static,
        P: Fn(T) -> PFut + Send + Sync + 'static,
        PFut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            supply: Arc::new(move || supply().boxed()),
            process: Arc::new(move |item| process(item).boxed()),
            on_success: None,
            on_failure: None,
            interval: Duration::ZERO,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn on_success(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl Fn(&str, &anyhow::Error) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Arc::new(f));
        self
    }
}

/// 取出 panic 载荷中的消息文本
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

pub struct Worker<T> {
    name: String,
    definition: WorkerDefinition<T>,
    state: Arc<Mutex<WorkerState>>,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Worker<T> {
    pub fn new(name: impl Into<String>, definition: WorkerDefinition<T>) -> Self {
        Self {
            name: name.into(),
            definition,
            state: Arc::new(Mutex::new(WorkerState::Created)),
            token: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 启动；仅在 `Created` 状态下生效
    pub fn start(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != WorkerState::Created {
            tracing::debug!(worker = %self.name, state = ?*state, "worker start ignored");
            return;
        }
        *state = WorkerState::Running;

        let handle = tokio::spawn(Self::run(
            self.name.clone(),
            self.definition.clone(),
            self.token.clone(),
            self.state.clone(),
        ));
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        tracing::info!(worker = %self.name, "worker started");
    }

    /// 请求停止；幂等，仅在 `Running` 状态下生效
    pub fn stop(&self) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == WorkerState::Running {
            self.token.cancel();
        }
    }

    /// 等待循环退出
    pub async fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(worker = %self.name, error = %err, "worker task aborted");
            }
        }
    }

    pub async fn shutdown(&self) {
        self.stop();
        self.join().await;
    }

    async fn run(
        name: String,
        definition: WorkerDefinition<T>,
        token: CancellationToken,
        state: Arc<Mutex<WorkerState>>,
    ) {
        loop {
            let item = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                item = (definition.supply)() => item,
            };
            let Some(item) = item else {
                tracing::info!(worker = %name, "worker source exhausted");
                break;
            };

            let outcome = AssertUnwindSafe((definition.process)(item))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(anyhow::anyhow!(
                        "worker process panicked: {}",
                        panic_message(panic.as_ref())
                    ))
                });

            match outcome {
                Ok(()) => {
                    if let Some(f) = &definition.on_success {
                        f(&name);
                    }
                }
                Err(err) => match &definition.on_failure {
                    Some(f) => f(&name, &err),
                    None => tracing::error!(worker = %name, error = %err, "worker iteration failed"),
                },
            }

            if definition.interval.is_zero() {
                if token.is_cancelled() {
                    break;
                }
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(definition.interval) => {}
                }
            }
        }

        *state.lock().unwrap_or_else(PoisonError::into_inner) = WorkerState::Stopped;
        tracing::info!(worker = %name, "worker stopped");
    }
}

/// 共享同一定义的一组 Worker
pub struct WorkerPool<T> {
    name: String,
    workers: Vec<Worker<T>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(name: impl Into<String>, size: usize, definition: WorkerDefinition<T>) -> Self {
        let name = name.into();
        let workers = (0..size.max(1))
            .map(|i| Worker::new(format!("{name}-{i}"), definition.clone()))
            .collect();
        Self { name, workers }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(Worker::state).collect()
    }

    pub fn start(&self) {
        self.workers.iter().for_each(Worker::start);
    }

    pub fn stop(&self) {
        self.workers.iter().for_each(Worker::stop);
    }

    pub async fn join(&self) {
        for worker in &self.workers {
            worker.join().await;
        }
    }

    pub async fn shutdown(&self) {
        self.stop();
        self.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::{Worker, WorkerDefinition, WorkerPool, WorkerState};
    use crate::messaging::{Envelope, EnvelopeQueue};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn failures_and_panics_do_not_stop_the_loop() {
        let processed = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = Arc::new(AtomicUsize::new(0));

        let definition = {
            let processed = processed.clone();
            let failures = failures.clone();
            let counter = counter.clone();
            WorkerDefinition::from_supplier(
                move || {
                    let counter = counter.clone();
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst);
                        (n < 6).then_some(n)
                    }
                },
                |n: usize| async move {
                    match n % 3 {
                        0 => Ok(()),
                        1 => Err(anyhow::anyhow!("boom {n}")),
                        _ => panic!("panic {n}"),
                    }
                },
            )
            .on_success(move |_| {
                processed.fetch_add(1, Ordering::SeqCst);
            })
            .on_failure(move |_, _| {
                failures.fetch_add(1, Ordering::SeqCst);
            })
        };

        let worker = Worker::new("w", definition);
        worker.start();
        timeout(Duration::from_secs(1), worker.join()).await.unwrap();

        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(processed.load(Ordering::SeqCst), 2);
        assert_eq!(failures.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let definition = {
            let ticks = ticks.clone();
            WorkerDefinition::from_action(move || {
                let ticks = ticks.clone();
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .interval(Duration::from_millis(5))
        };

        let worker = Worker::new("ticker", definition);
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Created);

        worker.start();
        worker.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        worker.stop();
        worker.stop();
        timeout(Duration::from_secs(1), worker.join()).await.unwrap();

        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(ticks.load(Ordering::SeqCst) >= 1);

        // 停止后不可重新启动
        worker.start();
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn stop_interrupts_blocked_supply_but_not_processing() {
        let queue = Arc::new(EnvelopeQueue::<u32>::new("q", 4));
        let finished = Arc::new(AtomicUsize::new(0));

        let definition = {
            let queue = queue.clone();
            let finished = finished.clone();
            WorkerDefinition::from_supplier(
                move || {
                    let queue = queue.clone();
                    async move { queue.dequeue().await.ok() }
                },
                move |_env: Envelope<u32>| {
                    let finished = finished.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )
        };

        let pool = WorkerPool::new("consumers", 2, definition);
        pool.start();
        queue.enqueue(Envelope::new(1, "c-1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        pool.stop();
        timeout(Duration::from_secs(1), pool.join()).await.unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(pool.states().iter().all(|s| *s == WorkerState::Stopped));
    }
}
