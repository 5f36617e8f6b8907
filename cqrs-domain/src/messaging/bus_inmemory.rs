//! 内存版消息总线（InMemoryMessageBus）
//!
//! 基于 `tokio::sync::broadcast`：`publish` 克隆并广播消息，
//! `subscribe` 返回 'static 消息流。无订阅者时发布的消息被忽略。
//! 典型用途：测试环境、示例与本地开发。
//!
use crate::error::{DomainError, DomainResult as Result};
use crate::messaging::{Message, MessageBus};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Clone)]
pub struct InMemoryMessageBus {
    tx: broadcast::Sender<Message>,
    published: Arc<AtomicUsize>,
}

impl InMemoryMessageBus {
    /// `capacity` 为广播缓冲区容量
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 累计发布的消息数
    pub fn published(&self) -> usize {
        self.published.load(Ordering::Acquire)
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, message: &Message) -> Result<()> {
        self.published.fetch_add(1, Ordering::AcqRel);
        let _ = self.tx.send(message.clone());
        Ok(())
    }

    async fn subscribe(&self) -> BoxStream<'static, Result<Message>> {
        let rx = self.tx.subscribe();
        BroadcastStream::new(rx)
            .map(|r| r.map_err(|e| DomainError::message_bus(e.to_string())))
            .boxed()
    }
}
