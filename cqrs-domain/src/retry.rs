//! 有界重试（指数退避 / 固定间隔）
//!
//! 用于事件发布与处理器调用：瞬时错误按配置退避后重试，
//! 永久错误立即返回，达到上限后返回最后一次错误。
//!
use crate::error::DomainError;
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 最大尝试次数（含首次），至少为 1
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// 退避倍数，1.0 即固定间隔
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// 固定间隔重试
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: interval,
            max_delay: interval,
            multiplier: 1.0,
        }
    }

    /// 不重试
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let scaled = delay.as_secs_f64() * self.multiplier.max(1.0);
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// 错误是否为瞬时错误（值得重试）
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// 版本冲突也视为瞬时：重新加载聚合后重跑用例即可能成功
impl IsTransient for DomainError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            DomainError::VersionConflict { .. }
                | DomainError::EventStore { .. }
                | DomainError::SnapshotStore { .. }
                | DomainError::MessageBus { .. }
        )
    }
}

/// 处理器返回的任意错误默认视为瞬时；其中的 `DomainError` 按自身分类
impl IsTransient for anyhow::Error {
    fn is_transient(&self) -> bool {
        self.downcast_ref::<DomainError>()
            .is_none_or(IsTransient::is_transient)
    }
}

/// 重试结束时的失败
#[derive(Debug)]
pub struct RetryError<E> {
    /// 实际尝试次数
    pub attempts: u32,
    /// 是否因永久错误提前结束
    pub permanent: bool,
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed after {} attempt(s): {}", self.attempts, self.error)
    }
}

/// 按配置执行操作，闭包参数为本次尝试序号（从 1 开始）
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + IsTransient,
{
    retry_with_backoff_when(config, E::is_transient, operation).await
}

/// 同 [`retry_with_backoff`]，由 `retryable` 决定错误是否值得重试
pub async fn retry_with_backoff_when<R, F, Fut, T, E>(
    config: &RetryConfig,
    retryable: R,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    R: Fn(&E) -> bool,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if !retryable(&error) => {
                return Err(RetryError {
                    attempts: attempt,
                    permanent: true,
                    error,
                });
            }
            Err(error) if attempt >= max_attempts => {
                return Err(RetryError {
                    attempts: attempt,
                    permanent: false,
                    error,
                });
            }
            Err(error) => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying after delay"
                );
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                delay = config.next_delay(delay);
            }
        }
    }
}
