//! 提交后发布（EventPublisher）
//!
//! 事件批次写入存储后，在后台任务中发布到消息总线：
//! 关联 ID 非空时发布整个事件流，否则逐条发布事件。
//! 发布失败按退避重试，最终失败只记录错误日志，不回滚已提交的事件，
//! 由外部补偿机制负责重新发布。
//!
use crate::domain_event::EventBatch;
use crate::error::DomainResult as Result;
use crate::messaging::{EventMessage, Message, MessageBus};
use crate::retry::{RetryConfig, retry_with_backoff};
use std::sync::Arc;
use tokio_util::task::TaskTracker;

#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn MessageBus>,
    retry: RetryConfig,
    tracker: TaskTracker,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, retry: RetryConfig) -> Self {
        Self {
            bus,
            retry,
            tracker: TaskTracker::new(),
        }
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// 批次对应的待发布消息
    pub fn messages_for(batch: &EventBatch) -> Vec<Message> {
        if batch.correlation_id().is_empty() {
            EventMessage::split(batch)
                .into_iter()
                .map(Message::from)
                .collect()
        } else {
            vec![Message::EventStream(batch.clone())]
        }
    }

    /// 在后台发布批次，立即返回
    pub fn spawn_publish(&self, batch: &EventBatch) {
        let messages = Self::messages_for(batch);
        let bus = self.bus.clone();
        let retry = self.retry.clone();
        let key = batch.key().clone();
        let version = batch.version();

        self.tracker.spawn(async move {
            let result = retry_with_backoff(&retry, |_| bus.publish_batch(&messages)).await;
            if let Err(err) = result {
                tracing::error!(
                    key = %key,
                    version = %version,
                    attempts = err.attempts,
                    error = %err.error,
                    "event publication failed; events are stored and need re-publication"
                );
            }
        });
    }

    /// 同步发布（带重试），用于命令结果等需要调用方感知失败的场景
    pub async fn publish(&self, message: &Message) -> Result<()> {
        retry_with_backoff(&self.retry, |_| self.bus.publish(message))
            .await
            .map_err(|err| err.error)
    }

    /// 等待所有后台发布完成
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// 进行中的后台发布数
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

#[cfg(test)]
mod tests {
    use super::EventPublisher;
    use crate::aggregate_key::AggregateKey;
    use crate::domain_event::{EventBatch, SerializedEvent};
    use crate::error::{DomainError, DomainResult};
    use crate::messaging::{InMemoryMessageBus, Message, MessageBus, MessageKind};
    use crate::retry::RetryConfig;
    use crate::value_object::Version;
    use async_trait::async_trait;
    use futures_core::stream::BoxStream;
    use futures_util::StreamExt;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn batch(correlation_id: &str) -> EventBatch {
        let event = SerializedEvent::builder()
            .event_type("AccountEvent.Deposited")
            .payload(json!({}))
            .build();
        EventBatch::builder()
            .key(AggregateKey::new("Account", "bank", "a-1"))
            .version(Version::from_value(1))
            .correlation_id(correlation_id)
            .events(vec![event.clone(), event])
            .build()
    }

    struct FailingBus {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl MessageBus for FailingBus {
        async fn publish(&self, _: &Message) -> DomainResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(DomainError::message_bus("broker unavailable"))
        }

        async fn subscribe(&self) -> BoxStream<'static, DomainResult<Message>> {
            futures_util::stream::empty().boxed()
        }
    }

    #[test]
    fn stream_or_individual_events_by_correlation_id() {
        let stream = EventPublisher::messages_for(&batch("cmd-1"));
        assert_eq!(stream.len(), 1);
        assert_eq!(stream[0].kind(), MessageKind::EventStream);

        let events = EventPublisher::messages_for(&batch(""));
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|m| m.kind() == MessageKind::Event));
    }

    #[tokio::test]
    async fn spawned_publication_reaches_bus() {
        let bus = Arc::new(InMemoryMessageBus::default());
        let mut stream = bus.subscribe().await;
        let publisher = EventPublisher::new(bus.clone(), RetryConfig::default());

        publisher.spawn_publish(&batch("cmd-1"));
        publisher.flush().await;

        let msg = stream.next().await.unwrap().unwrap();
        assert_eq!(msg.correlation_id(), "cmd-1");
        assert_eq!(publisher.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_publication_is_retried_then_given_up() {
        let bus = Arc::new(FailingBus {
            attempts: AtomicUsize::new(0),
        });
        let publisher =
            EventPublisher::new(bus.clone(), RetryConfig::fixed(3, Duration::from_millis(10)));

        publisher.spawn_publish(&batch("cmd-1"));
        publisher.flush().await;

        assert_eq!(bus.attempts.load(Ordering::SeqCst), 3);
    }
}
