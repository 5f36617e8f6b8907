//! 处理器调用链（Executor）
//!
//! 注册时为每个处理器组装一条装饰链（由外到内）：
//! 幂等检查 → 重试 → 通知 → 处理器。
//! - 幂等层：已执行过则跳过；成功后写入执行记录，失败绝不写入；
//! - 重试层：固定间隔重试失败，耗尽后返回 `HandlerFailed`；
//!   开启 `fail_fast` 时永久错误不再重试；
//! - 通知层：捕获处理器的 panic，每次尝试结束后把耗时与结果交给 [`HandlerObserver`]。
//!
use crate::context::HandlerContext;
use crate::error::{DispatchError, DispatchResult as Result};
use crate::handler::{HandledTypes, MessageHandler};
use crate::handler_record::{HandlerRecord, HandlerRecordStore};
use async_trait::async_trait;
use cqrs_domain::messaging::{Message, MessageKind, panic_message};
use cqrs_domain::retry::{IsTransient, RetryConfig, retry_with_backoff_when};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 单个处理器的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 处理器被调用且成功
    Handled,
    /// 已执行过，跳过调用
    Skipped,
}

/// 处理器调用观察者
pub trait HandlerObserver: Send + Sync {
    fn on_success(&self, ctx: &HandlerContext, elapsed: Duration);
    fn on_failure(&self, ctx: &HandlerContext, elapsed: Duration, error: &anyhow::Error);
}

/// 默认观察者：写日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl HandlerObserver for TracingObserver {
    fn on_success(&self, ctx: &HandlerContext, elapsed: Duration) {
        tracing::debug!(
            handler = %ctx.handler,
            message_id = %ctx.message_id,
            message_type = %ctx.message_type,
            attempt = ctx.attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            "handler succeeded"
        );
    }

    fn on_failure(&self, ctx: &HandlerContext, elapsed: Duration, error: &anyhow::Error) {
        tracing::warn!(
            handler = %ctx.handler,
            message_id = %ctx.message_id,
            message_type = %ctx.message_type,
            attempt = ctx.attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %error,
            "handler attempt failed"
        );
    }
}

#[async_trait]
trait Invoke: Send + Sync {
    async fn invoke(&self, ctx: &HandlerContext, message: &Message) -> Result<Outcome>;
}

struct Notifying {
    handler: Arc<dyn MessageHandler>,
    observer: Arc<dyn HandlerObserver>,
}

#[async_trait]
impl Invoke for Notifying {
    async fn invoke(&self, ctx: &HandlerContext, message: &Message) -> Result<Outcome> {
        let started = Instant::now();
        let result = AssertUnwindSafe(self.handler.handle(ctx, message))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                ))
            });
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                self.observer.on_success(ctx, elapsed);
                Ok(Outcome::Handled)
            }
            Err(source) => {
                self.observer.on_failure(ctx, elapsed, &source);
                Err(DispatchError::HandlerFailed {
                    handler: ctx.handler.clone(),
                    attempts: ctx.attempt,
                    source,
                })
            }
        }
    }
}

struct Retrying {
    inner: Arc<dyn Invoke>,
    policy: RetryConfig,
    fail_fast: bool,
}

#[async_trait]
impl Invoke for Retrying {
    async fn invoke(&self, ctx: &HandlerContext, message: &Message) -> Result<Outcome> {
        let inner = &self.inner;
        let fail_fast = self.fail_fast;
        let retryable = |err: &DispatchError| !fail_fast || err.is_transient();
        let result = retry_with_backoff_when(&self.policy, retryable, |attempt| {
            let ctx = ctx.with_attempt(attempt);
            async move { inner.invoke(&ctx, message).await }
        })
        .await;

        result.map_err(|err| {
            tracing::error!(
                handler = %ctx.handler,
                message_id = %ctx.message_id,
                message_type = %ctx.message_type,
                attempts = err.attempts,
                permanent = err.permanent,
                error = %err.error,
                "handler failed"
            );
            match err.error {
                DispatchError::HandlerFailed {
                    handler, source, ..
                } => DispatchError::HandlerFailed {
                    handler,
                    attempts: err.attempts,
                    source,
                },
                other => other,
            }
        })
    }
}

struct Idempotent {
    inner: Arc<dyn Invoke>,
    records: Arc<dyn HandlerRecordStore>,
}

#[async_trait]
impl Invoke for Idempotent {
    async fn invoke(&self, ctx: &HandlerContext, message: &Message) -> Result<Outcome> {
        let record = HandlerRecord::for_message(message, &ctx.handler);
        if self.records.is_executed(&record).await? {
            tracing::debug!(
                handler = %ctx.handler,
                message_id = %ctx.message_id,
                "message already handled, skipped"
            );
            return Ok(Outcome::Skipped);
        }

        let outcome = self.inner.invoke(ctx, message).await?;
        self.records.add(record).await?;
        Ok(outcome)
    }
}

/// 组装完成的处理器调用链
pub struct Executor {
    name: String,
    kind: MessageKind,
    handled_types: HandledTypes,
    chain: Arc<dyn Invoke>,
}

impl Executor {
    /// `fail_fast` 为真时，被判定为永久的错误不再重试
    pub fn compose(
        handler: Arc<dyn MessageHandler>,
        records: Arc<dyn HandlerRecordStore>,
        retry: RetryConfig,
        fail_fast: bool,
        observer: Arc<dyn HandlerObserver>,
    ) -> Self {
        let name = handler.handler_name().to_string();
        let kind = handler.kind();
        let handled_types = handler.handled_types();

        let notifying: Arc<dyn Invoke> = Arc::new(Notifying { handler, observer });
        let retrying: Arc<dyn Invoke> = Arc::new(Retrying {
            inner: notifying,
            policy: retry,
            fail_fast,
        });
        let chain: Arc<dyn Invoke> = Arc::new(Idempotent {
            inner: retrying,
            records,
        });

        Self {
            name,
            kind,
            handled_types,
            chain,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn handled_types(&self) -> &HandledTypes {
        &self.handled_types
    }

    pub async fn execute(&self, message: &Message) -> Result<Outcome> {
        let ctx = HandlerContext::new(message, &self.name);
        self.chain.invoke(&ctx, message).await
    }
}
