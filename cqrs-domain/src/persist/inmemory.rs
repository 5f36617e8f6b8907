//! 内存版持久化适配器
//!
//! 基于 `DashMap` 的事件与快照存储，满足 `EventStorage` / `SnapshotStore` 协议，
//! 典型用途：测试环境、示例与本地开发。
//!
use crate::aggregate_key::AggregateKey;
use crate::domain_event::EventBatch;
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{EventStorage, SerializedSnapshot, SnapshotStore};
use crate::value_object::Version;
use async_trait::async_trait;
use dashmap::DashMap;

/// 内存事件存储，每个聚合一条按版本追加的流
#[derive(Debug, Default)]
pub struct InMemoryEventStorage {
    streams: DashMap<AggregateKey, Vec<EventBatch>>,
}

impl InMemoryEventStorage {
    /// 全部聚合的批次总数
    pub fn batch_count(&self) -> usize {
        self.streams.iter().map(|s| s.value().len()).sum()
    }
}

#[async_trait]
impl EventStorage for InMemoryEventStorage {
    async fn current_version(&self, key: &AggregateKey) -> Result<Version> {
        Ok(self
            .streams
            .get(key)
            .and_then(|s| s.last().map(EventBatch::version))
            .unwrap_or_default())
    }

    async fn append(&self, batch: &EventBatch) -> Result<()> {
        // 校验与写入在同一把分片锁内完成
        let mut stream = self.streams.entry(batch.key().clone()).or_default();
        let current = stream.last().map(EventBatch::version).unwrap_or_default();
        if !batch.version().follows(current) {
            return Err(DomainError::VersionConflict {
                key: batch.key().to_string(),
                expected: current.next().value(),
                actual: batch.version().value(),
            });
        }
        stream.push(batch.clone());
        Ok(())
    }

    async fn load_after(&self, key: &AggregateKey, after: Version) -> Result<Vec<EventBatch>> {
        Ok(self
            .streams
            .get(key)
            .map(|s| {
                s.iter()
                    .filter(|b| b.version() > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove_all(&self, key: &AggregateKey) -> Result<()> {
        self.streams.remove(key);
        Ok(())
    }
}

/// 内存快照存储，每个聚合只保留最高版本
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: DashMap<AggregateKey, SerializedSnapshot>,
}

impl InMemorySnapshotStore {
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get_latest(&self, key: &AggregateKey) -> Result<Option<SerializedSnapshot>> {
        Ok(self.snapshots.get(key).map(|s| s.value().clone()))
    }

    async fn save(&self, snapshot: SerializedSnapshot) -> Result<()> {
        self.snapshots
            .entry(snapshot.key().clone())
            .and_modify(|existing| {
                if snapshot.version() > existing.version() {
                    *existing = snapshot.clone();
                }
            })
            .or_insert_with(|| snapshot.clone());
        Ok(())
    }

    async fn remove(&self, key: &AggregateKey) -> Result<()> {
        self.snapshots.remove(key);
        Ok(())
    }
}
