//! 事件存储（EventStore）
//!
//! `EventStorage` 是持久化适配器边界：按聚合追加批次、读取某版本之后的批次、
//! 删除全部历史。`EventStore` 在其之上实现版本校验：
//! - 先查版本缓存，缓存给出确定结论时不访问存储；
//! - 缓存未命中（或可能落后于其他进程）时查询存储当前版本；
//! - 校验通过后整体追加，成功后推进缓存。
//!
use crate::aggregate_key::AggregateKey;
use crate::domain_event::EventBatch;
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::VersionCache;
use crate::value_object::Version;
use async_trait::async_trait;
use std::sync::Arc;

/// 事件持久化适配器
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// 已持久化的最大版本，无历史时为 0
    async fn current_version(&self, key: &AggregateKey) -> Result<Version>;

    /// 原子追加一个批次；存储中的最大版本不是 `batch.version - 1` 时
    /// 必须返回 `VersionConflict` 且不写入任何事件
    async fn append(&self, batch: &EventBatch) -> Result<()>;

    /// 版本大于 `after` 的全部批次
    async fn load_after(&self, key: &AggregateKey, after: Version) -> Result<Vec<EventBatch>>;

    async fn remove_all(&self, key: &AggregateKey) -> Result<()>;
}

#[async_trait]
impl<T> EventStorage for Arc<T>
where
    T: EventStorage + ?Sized,
{
    async fn current_version(&self, key: &AggregateKey) -> Result<Version> {
        (**self).current_version(key).await
    }

    async fn append(&self, batch: &EventBatch) -> Result<()> {
        (**self).append(batch).await
    }

    async fn load_after(&self, key: &AggregateKey, after: Version) -> Result<Vec<EventBatch>> {
        (**self).load_after(key, after).await
    }

    async fn remove_all(&self, key: &AggregateKey) -> Result<()> {
        (**self).remove_all(key).await
    }
}

/// 带版本校验的事件存储
pub struct EventStore {
    storage: Arc<dyn EventStorage>,
    versions: VersionCache,
}

impl EventStore {
    pub fn new(storage: Arc<dyn EventStorage>) -> Self {
        Self::with_version_cache(storage, VersionCache::default())
    }

    pub fn with_version_cache(storage: Arc<dyn EventStorage>, versions: VersionCache) -> Self {
        Self { storage, versions }
    }

    pub fn versions(&self) -> &VersionCache {
        &self.versions
    }

    /// 保存一个批次
    ///
    /// 仅当 `batch.version == 最近接受的版本 + 1` 时写入；
    /// 否则返回 `VersionConflict`，不修改已存储的历史。
    pub async fn save(&self, batch: &EventBatch) -> Result<()> {
        batch.validate()?;

        let key = batch.key();
        let version = batch.version();

        match self.versions.get(key) {
            // 已接受过同一版本或更高版本：重复或乱序投递
            Some(cached) if version <= cached => return Err(self.reject(batch, cached)),
            Some(cached) if version.follows(cached) => {}
            // 未命中，或其他进程可能已经推进了版本
            _ => {
                let current = self.storage.current_version(key).await?;
                self.versions.advance(key, current);
                if !version.follows(current) {
                    return Err(self.reject(batch, current));
                }
            }
        }

        match self.storage.append(batch).await {
            Ok(()) => {
                self.versions.advance(key, version);
                tracing::debug!(key = %key, version = %version, events = batch.len(), "event batch saved");
                Ok(())
            }
            Err(err) => {
                if err.is_conflict() {
                    // 并发写入者抢先，缓存已不可信
                    self.versions.remove(key);
                    tracing::warn!(key = %key, version = %version, error = %err, "event batch lost a write race");
                }
                Err(err)
            }
        }
    }

    fn reject(&self, batch: &EventBatch, current: Version) -> DomainError {
        tracing::warn!(
            key = %batch.key(),
            current = %current,
            version = %batch.version(),
            correlation_id = batch.correlation_id(),
            "event batch rejected: version is not current + 1"
        );
        DomainError::VersionConflict {
            key: batch.key().to_string(),
            expected: current.next().value(),
            actual: batch.version().value(),
        }
    }

    /// 读取版本大于 `after` 的批次，按版本升序且无间隙
    pub async fn find_all(&self, key: &AggregateKey, after: Version) -> Result<Vec<EventBatch>> {
        let mut batches = self.storage.load_after(key, after).await?;
        batches.sort_by_key(EventBatch::version);

        let mut expected = after;
        for batch in &batches {
            if batch.key() != key || !batch.version().follows(expected) {
                return Err(DomainError::RehydrationInconsistency {
                    key: key.to_string(),
                    reason: format!(
                        "expected {} after {}, found {} for {}",
                        expected.next(),
                        expected,
                        batch.version(),
                        batch.key()
                    ),
                });
            }
            expected = batch.version();
        }

        Ok(batches)
    }

    /// 删除聚合的全部历史
    pub async fn remove_all(&self, key: &AggregateKey) -> Result<()> {
        self.versions.remove(key);
        self.storage.remove_all(key).await?;
        self.versions.remove(key);
        Ok(())
    }
}
