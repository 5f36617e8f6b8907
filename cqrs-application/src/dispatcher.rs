//! 调度器（Dispatcher）
//!
//! 为一条消息解析处理器并执行其调用链：
//! - 没有处理器是配置错误（`HandlerNotFound`）；
//! - 命令与结果只允许一个处理器，否则 `HandlerAmbiguous`；
//! - 事件与事件流并发扇出给全部匹配的处理器。
//!
//! 无论成败都返回本次执行的耗时。
//!
use crate::command::Command;
use crate::error::{DispatchError, DispatchResult as Result};
use crate::executor::{Executor, HandlerObserver, Outcome, TracingObserver};
use crate::handler::{
    CommandAdapter, CommandHandler, EventAdapter, EventHandler, EventStreamAdapter,
    EventStreamHandler, MessageHandler,
};
use crate::handler_record::HandlerRecordStore;
use crate::registry::HandlerRegistry;
use cqrs_domain::aggregate::Aggregate;
use cqrs_domain::domain_event::DomainEvent;
use cqrs_domain::event_upcaster::EventUpcasterChain;
use cqrs_domain::messaging::Message;
use cqrs_domain::retry::RetryConfig;
use futures_util::{StreamExt, stream};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 调度器配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 处理器重试（固定间隔）
    pub handler_retry: RetryConfig,
    /// 单条事件扇出时的处理并发
    pub handler_concurrency: usize,
    /// 永久错误（载荷、业务规则）不再重试，默认关闭
    pub fail_fast_on_permanent: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            handler_retry: RetryConfig::fixed(3, Duration::from_millis(500)),
            handler_concurrency: 8,
            fail_fast_on_permanent: false,
        }
    }
}

/// 一次执行的结果
#[derive(Debug)]
pub struct Execution {
    pub elapsed: Duration,
    pub outcome: Result<Outcome>,
}

impl Execution {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn into_result(self) -> Result<Outcome> {
        self.outcome
    }
}

pub struct Dispatcher {
    registry: HandlerRegistry,
    records: Arc<dyn HandlerRecordStore>,
    observer: Arc<dyn HandlerObserver>,
    upcasters: EventUpcasterChain,
    config: DispatcherConfig,
}

#[bon::bon]
impl Dispatcher {
    #[builder]
    pub fn new(
        records: Arc<dyn HandlerRecordStore>,
        observer: Option<Arc<dyn HandlerObserver>>,
        #[builder(default)] upcasters: EventUpcasterChain,
        #[builder(default)] config: DispatcherConfig,
    ) -> Self {
        Self {
            registry: HandlerRegistry::new(),
            records,
            observer: observer.unwrap_or_else(|| Arc::new(TracingObserver)),
            upcasters,
            config,
        }
    }
}

impl Dispatcher {
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// 注册处理器，调用链在此时组装
    pub fn register(&self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let executor = Executor::compose(
            handler,
            self.records.clone(),
            self.config.handler_retry.clone(),
            self.config.fail_fast_on_permanent,
            self.observer.clone(),
        );
        self.registry.register(executor)
    }

    pub fn register_command<C, H>(&self, name: impl Into<String>, handler: H) -> Result<()>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        self.register(Arc::new(CommandAdapter::<C, H>::new(name, handler)))
    }

    pub fn register_event<E, H>(&self, name: impl Into<String>, handler: H) -> Result<()>
    where
        E: DomainEvent,
        H: EventHandler<E> + 'static,
    {
        self.register(Arc::new(EventAdapter::<E, H>::new(name, handler)))
    }

    /// 注册事件流处理器；解码时使用调度器的上抬链
    pub fn register_event_stream<A, H>(&self, name: impl Into<String>, handler: H) -> Result<()>
    where
        A: Aggregate,
        H: EventStreamHandler<A> + 'static,
    {
        self.register(Arc::new(EventStreamAdapter::<A, H>::new(
            name,
            handler,
            self.upcasters.clone(),
        )))
    }

    /// 执行一条消息
    pub async fn execute(&self, message: &Message) -> Execution {
        let started = Instant::now();
        let outcome = self.dispatch(message).await;
        let elapsed = started.elapsed();

        if let Err(err) = &outcome {
            tracing::warn!(
                message_id = message.message_id(),
                kind = %message.kind(),
                elapsed_ms = elapsed.as_millis() as u64,
                error = %err,
                "message execution failed"
            );
        }
        Execution { elapsed, outcome }
    }

    async fn dispatch(&self, message: &Message) -> Result<Outcome> {
        let kind = message.kind();
        let message_type = message.message_type();
        let executors = self.registry.resolve(kind, &message_type);

        match executors.len() {
            0 => Err(DispatchError::HandlerNotFound { kind, message_type }),
            1 => executors[0].execute(message).await,
            _ if !kind.allows_fan_out() => Err(DispatchError::HandlerAmbiguous {
                message_type,
                handlers: executors.iter().map(|e| e.name().to_string()).collect(),
            }),
            _ => {
                let runs: Vec<_> = executors
                    .iter()
                    .cloned()
                    .map(|executor| async move { executor.execute(message).await })
                    .collect();
                let results: Vec<Result<Outcome>> = stream::iter(runs)
                    .buffer_unordered(self.config.handler_concurrency.max(1))
                    .collect()
                    .await;
                fold_fan_out(results)
            }
        }
    }
}

/// 全部跳过才算跳过；任一失败则返回第一个失败
fn fold_fan_out(results: Vec<Result<Outcome>>) -> Result<Outcome> {
    let mut outcome = Outcome::Skipped;
    let mut first_error = None;
    for result in results {
        match result {
            Ok(Outcome::Handled) => outcome = Outcome::Handled,
            Ok(Outcome::Skipped) => {}
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(outcome),
    }
}
