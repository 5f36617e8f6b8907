//! 批量持久化的执行记录
//!
//! 持久存储中的记录永久保留。写入先进入内存缓冲，由后台任务在缓冲达到
//! `max_batch` 条或每隔 `flush_interval` 时批量落盘；查询先查缓冲再查存储。
//! 落盘失败的记录留在缓冲中等待下一轮。
//!
use crate::handler_record::{HandlerRecord, HandlerRecordConfig, HandlerRecordStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cqrs_domain::error::DomainResult as Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// 执行记录的持久化边界
#[async_trait]
pub trait HandlerRecordStorage: Send + Sync {
    async fn contains(&self, record: &HandlerRecord) -> Result<bool>;
    /// 原子写入一批记录；已存在的记录应被忽略
    async fn insert_batch(&self, records: &[(HandlerRecord, DateTime<Utc>)]) -> Result<()>;
}

#[async_trait]
impl<T> HandlerRecordStorage for Arc<T>
where
    T: HandlerRecordStorage + ?Sized,
{
    async fn contains(&self, record: &HandlerRecord) -> Result<bool> {
        (**self).contains(record).await
    }

    async fn insert_batch(&self, records: &[(HandlerRecord, DateTime<Utc>)]) -> Result<()> {
        (**self).insert_batch(records).await
    }
}

type Buffer = DashMap<HandlerRecord, DateTime<Utc>>;

pub struct BatchingHandlerRecordStore<S> {
    storage: Arc<S>,
    buffer: Arc<Buffer>,
    max_batch: usize,
    wake: Arc<Notify>,
    token: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl<S: HandlerRecordStorage + 'static> BatchingHandlerRecordStore<S> {
    /// 创建并启动后台落盘任务，需在 tokio 运行时内调用
    pub fn new(storage: Arc<S>, config: &HandlerRecordConfig) -> Self {
        let buffer = Arc::new(Buffer::new());
        let wake = Arc::new(Notify::new());
        let token = CancellationToken::new();

        let flusher = tokio::spawn(Self::flush_loop(
            storage.clone(),
            buffer.clone(),
            wake.clone(),
            token.clone(),
            config.flush_interval,
        ));

        Self {
            storage,
            buffer,
            max_batch: config.max_batch.max(1),
            wake,
            token,
            flusher: Mutex::new(Some(flusher)),
        }
    }

    /// 尚未落盘的记录数
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// 立即落盘当前缓冲
    pub async fn flush(&self) -> Result<()> {
        Self::flush_buffer(self.storage.as_ref(), &self.buffer).await
    }

    /// 停止后台任务并落盘剩余记录
    pub async fn shutdown(&self) -> Result<()> {
        self.token.cancel();
        let flusher = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(flusher) = flusher {
            if let Err(err) = flusher.await {
                tracing::error!(error = %err, "handler record flusher aborted");
            }
        }
        self.flush().await
    }

    async fn flush_loop(
        storage: Arc<S>,
        buffer: Arc<Buffer>,
        wake: Arc<Notify>,
        token: CancellationToken,
        interval: std::time::Duration,
    ) {
        let mut ticker = time::interval(interval.max(std::time::Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = wake.notified() => {}
                _ = ticker.tick() => {}
            }
            if let Err(err) = Self::flush_buffer(storage.as_ref(), &buffer).await {
                tracing::warn!(pending = buffer.len(), error = %err, "handler record flush failed");
            }
        }
    }

    async fn flush_buffer(storage: &S, buffer: &Buffer) -> Result<()> {
        let batch: Vec<(HandlerRecord, DateTime<Utc>)> = buffer
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        if batch.is_empty() {
            return Ok(());
        }

        storage.insert_batch(&batch).await?;
        for (record, _) in &batch {
            buffer.remove(record);
        }
        tracing::debug!(records = batch.len(), "handler records flushed");
        Ok(())
    }
}

#[async_trait]
impl<S: HandlerRecordStorage + 'static> HandlerRecordStore for BatchingHandlerRecordStore<S> {
    async fn is_executed(&self, record: &HandlerRecord) -> Result<bool> {
        if self.buffer.contains_key(record) {
            return Ok(true);
        }
        self.storage.contains(record).await
    }

    async fn add(&self, record: HandlerRecord) -> Result<()> {
        self.buffer.insert(record, Utc::now());
        if self.buffer.len() >= self.max_batch {
            self.wake.notify_one();
        }
        Ok(())
    }
}

impl<S> Drop for BatchingHandlerRecordStore<S> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// 内存版持久存储，主要用于测试
#[derive(Default)]
pub struct InMemoryHandlerRecordStorage {
    records: DashMap<HandlerRecord, DateTime<Utc>>,
    batches: AtomicUsize,
}

impl InMemoryHandlerRecordStorage {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 收到的批量写入次数
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::Acquire)
    }
}

#[async_trait]
impl HandlerRecordStorage for InMemoryHandlerRecordStorage {
    async fn contains(&self, record: &HandlerRecord) -> Result<bool> {
        Ok(self.records.contains_key(record))
    }

    async fn insert_batch(&self, records: &[(HandlerRecord, DateTime<Utc>)]) -> Result<()> {
        for (record, recorded_at) in records {
            self.records.entry(record.clone()).or_insert(*recorded_at);
        }
        self.batches.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchingHandlerRecordStore, InMemoryHandlerRecordStorage};
    use crate::handler_record::{HandlerRecord, HandlerRecordConfig, HandlerRecordStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn record(id: usize) -> HandlerRecord {
        HandlerRecord::new(format!("m-{id}"), "bank.Deposit", "deposit-handler")
    }

    fn config(max_batch: usize, flush_interval: Duration) -> HandlerRecordConfig {
        HandlerRecordConfig {
            max_batch,
            flush_interval,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn buffered_records_are_visible_before_flush() {
        let storage = Arc::new(InMemoryHandlerRecordStorage::default());
        let store = BatchingHandlerRecordStore::new(storage.clone(), &config(100, Duration::from_secs(3600)));

        store.add(record(1)).await.unwrap();
        assert!(store.is_executed(&record(1)).await.unwrap());
        assert!(storage.is_empty());

        store.shutdown().await.unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(store.pending(), 0);
        assert!(store.is_executed(&record(1)).await.unwrap());
    }

    #[tokio::test]
    async fn full_batch_wakes_the_flusher() {
        let storage = Arc::new(InMemoryHandlerRecordStorage::default());
        let store = BatchingHandlerRecordStore::new(storage.clone(), &config(3, Duration::from_secs(3600)));

        for i in 0..3 {
            store.add(record(i)).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while storage.len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(store.pending(), 0);
        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn interval_flushes_partial_batches() {
        let storage = Arc::new(InMemoryHandlerRecordStorage::default());
        let store = BatchingHandlerRecordStore::new(storage.clone(), &config(100, Duration::from_millis(20)));

        store.add(record(1)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while storage.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(storage.batches() >= 1);
        store.shutdown().await.unwrap();
    }
}
