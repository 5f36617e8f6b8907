//! 信封（Envelope）
//!
//! 在流水线中包裹消息体，携带关联 ID 与三段耗时：
//! - `wait_time`：从创建到入队；
//! - `delay`：在队列中等待（自该关联 ID 首次入队起算）；
//! - `processing_time`：处理耗时。
//!
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    body: T,
    correlation_id: String,
    created_at: Instant,
    pub(crate) enqueued_at: Option<Instant>,
    pub(crate) wait_time: Duration,
    pub(crate) delay: Duration,
    processing_time: Duration,
}

impl<T> Envelope<T> {
    pub fn new(body: T, correlation_id: impl Into<String>) -> Self {
        Self {
            body,
            correlation_id: correlation_id.into(),
            created_at: Instant::now(),
            enqueued_at: None,
            wait_time: Duration::ZERO,
            delay: Duration::ZERO,
            processing_time: Duration::ZERO,
        }
    }

    pub fn body(&self) -> &T {
        &self.body
    }

    pub fn into_body(self) -> T {
        self.body
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn enqueued_at(&self) -> Option<Instant> {
        self.enqueued_at
    }

    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn processing_time(&self) -> Duration {
        self.processing_time
    }

    pub fn set_processing_time(&mut self, elapsed: Duration) {
        self.processing_time = elapsed;
    }

    /// 替换消息体，保留关联 ID 与耗时
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            body: f(self.body),
            correlation_id: self.correlation_id,
            created_at: self.created_at,
            enqueued_at: self.enqueued_at,
            wait_time: self.wait_time,
            delay: self.delay,
            processing_time: self.processing_time,
        }
    }
}
