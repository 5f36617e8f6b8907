//! 消息总线（MessageBus）协议
//!
//! 外部消息中间件的边界：至少一次发布，订阅返回 'static 生命周期的消息流，
//! 以便在 tokio::spawn 或 Worker 中消费。
//!
use crate::error::DomainResult as Result;
use crate::messaging::Message;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use std::sync::Arc;

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, message: &Message) -> Result<()>;

    async fn publish_batch(&self, messages: &[Message]) -> Result<()> {
        for message in messages {
            self.publish(message).await?;
        }
        Ok(())
    }

    async fn subscribe(&self) -> BoxStream<'static, Result<Message>>;
}

#[async_trait]
impl<T> MessageBus for Arc<T>
where
    T: MessageBus + ?Sized,
{
    async fn publish(&self, message: &Message) -> Result<()> {
        (**self).publish(message).await
    }

    async fn publish_batch(&self, messages: &[Message]) -> Result<()> {
        (**self).publish_batch(messages).await
    }

    async fn subscribe(&self) -> BoxStream<'static, Result<Message>> {
        (**self).subscribe().await
    }
}
