//! 有界信封队列（EnvelopeQueue）
//!
//! 生产者信号量（初始为容量 N）与消费者信号量（初始为 0）配合 FIFO 队列：
//! - `enqueue`：获取生产者许可（满时阻塞），登记关联 ID 的首次入队时间，入队并唤醒消费者；
//! - `dequeue`：获取消费者许可（空时阻塞），出队并按首次入队时间计算 `delay`；
//! - `complete`：归还一个生产者许可并广播完成通知。
//!
//! 许可只在 `complete` 时归还，因此“已入队 - 已完成”永远不超过容量。
//! 队列不丢弃消息，阻塞是唯一的背压手段。
//!
use crate::error::{DomainError, DomainResult as Result};
use crate::messaging::Envelope;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, broadcast};

const COMPLETION_CHANNEL_CAPACITY: usize = 256;

/// 完成通知，用于延迟观测
#[derive(Debug, Clone, PartialEq)]
pub struct QueueCompletion {
    pub queue: String,
    pub correlation_id: String,
    pub wait_time: Duration,
    pub delay: Duration,
    pub processing_time: Duration,
}

pub struct EnvelopeQueue<T> {
    name: String,
    capacity: usize,
    producer: Semaphore,
    consumer: Semaphore,
    items: Mutex<VecDeque<Envelope<T>>>,
    first_seen: DashMap<String, Instant>,
    outstanding: AtomicUsize,
    completions: broadcast::Sender<QueueCompletion>,
}

impl<T> EnvelopeQueue<T> {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (completions, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            capacity,
            producer: Semaphore::new(capacity),
            consumer: Semaphore::new(0),
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            first_seen: DashMap::new(),
            outstanding: AtomicUsize::new(0),
            completions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前排队（尚未被取出）的数量
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 已入队但尚未完成的数量
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.producer.is_closed()
    }

    fn closed(&self) -> DomainError {
        DomainError::QueueClosed {
            queue: self.name.clone(),
        }
    }

    /// 入队；达到容量时等待，直到某个已入队的信封被 `complete`
    pub async fn enqueue(&self, mut envelope: Envelope<T>) -> Result<()> {
        let permit = self.producer.acquire().await.map_err(|_| self.closed())?;
        permit.forget();

        let now = Instant::now();
        envelope.enqueued_at = Some(now);
        envelope.wait_time = now.saturating_duration_since(envelope.created_at());
        self.first_seen
            .entry(envelope.correlation_id().to_string())
            .or_insert(now);

        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(envelope);
        self.consumer.add_permits(1);
        Ok(())
    }

    /// 出队；队列为空时等待。可安全地在 `select!` 中取消
    pub async fn dequeue(&self) -> Result<Envelope<T>> {
        let permit = self.consumer.acquire().await.map_err(|_| self.closed())?;
        permit.forget();
        self.pop().ok_or_else(|| self.closed())
    }

    /// 非阻塞出队
    pub fn try_dequeue(&self) -> Option<Envelope<T>> {
        let permit = self.consumer.try_acquire().ok()?;
        permit.forget();
        self.pop()
    }

    fn pop(&self) -> Option<Envelope<T>> {
        let mut envelope = self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()?;

        let now = Instant::now();
        let since = self
            .first_seen
            .remove(envelope.correlation_id())
            .map(|(_, t)| t)
            .or(envelope.enqueued_at())
            .unwrap_or(now);
        envelope.delay = now.saturating_duration_since(since);
        Some(envelope)
    }

    /// 完成一个信封：归还容量并广播通知。
    /// 完成次数超过入队次数时忽略并返回 `false`
    pub fn complete(&self, envelope: &Envelope<T>) -> bool {
        let released = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if !released {
            tracing::warn!(queue = %self.name, correlation_id = envelope.correlation_id(), "complete called without outstanding envelope");
            return false;
        }

        self.producer.add_permits(1);

        let completion = QueueCompletion {
            queue: self.name.clone(),
            correlation_id: envelope.correlation_id().to_string(),
            wait_time: envelope.wait_time(),
            delay: envelope.delay(),
            processing_time: envelope.processing_time(),
        };
        tracing::debug!(
            queue = %self.name,
            correlation_id = envelope.correlation_id(),
            wait_ms = completion.wait_time.as_millis() as u64,
            delay_ms = completion.delay.as_millis() as u64,
            processing_ms = completion.processing_time.as_millis() as u64,
            "envelope completed"
        );
        // 无订阅者时发送失败，属正常情况
        let _ = self.completions.send(completion);
        true
    }

    pub fn subscribe_completions(&self) -> broadcast::Receiver<QueueCompletion> {
        self.completions.subscribe()
    }

    /// 关闭队列：之后的 `enqueue`/`dequeue` 返回 `QueueClosed`，等待中的调用被唤醒
    pub fn close(&self) {
        self.producer.close();
        self.consumer.close();
    }
}

/// 按消息类型划分的队列注册表，按需创建，各队列的容量互不占用
pub struct EnvelopeQueues<T> {
    capacity: usize,
    queues: DashMap<String, Arc<EnvelopeQueue<T>>>,
}

impl<T> EnvelopeQueues<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, message_type: &str) -> Option<Arc<EnvelopeQueue<T>>> {
        self.queues.get(message_type).map(|q| q.clone())
    }

    pub fn queue_for(&self, message_type: &str) -> Arc<EnvelopeQueue<T>> {
        self.get_or_create(message_type).0
    }

    /// 取得或创建队列；第二个值表示本次调用是否新建了队列
    pub fn get_or_create(&self, message_type: &str) -> (Arc<EnvelopeQueue<T>>, bool) {
        if let Some(queue) = self.get(message_type) {
            return (queue, false);
        }
        match self.queues.entry(message_type.to_string()) {
            Entry::Occupied(slot) => (slot.get().clone(), false),
            Entry::Vacant(slot) => {
                let queue = Arc::new(EnvelopeQueue::new(message_type, self.capacity));
                slot.insert(queue.clone());
                tracing::debug!(queue = message_type, capacity = self.capacity, "envelope queue created");
                (queue, true)
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.queues.iter().map(|q| q.key().clone()).collect()
    }

    pub fn all(&self) -> Vec<Arc<EnvelopeQueue<T>>> {
        self.queues.iter().map(|q| q.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn close_all(&self) {
        self.queues.iter().for_each(|q| q.close());
    }
}
