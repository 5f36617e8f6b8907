//! 聚合仓储（Repository）
//!
//! 编排“缓存 → 快照 → 事件回放”的加载流程，以及“写事件 → 更新缓存 →
//! 异步发布 → 按策略落快照”的保存流程。
//!
use crate::aggregate::Aggregate;
use crate::aggregate_key::AggregateKey;
use crate::aggregate_root::AggregateRoot;
use crate::error::DomainResult as Result;
use crate::event_upcaster::EventUpcasterChain;
use crate::messaging::EventPublisher;
use crate::persist::{
    AggregateCache, DEFAULT_SHARDS, EventStorage, EventStore, SerializedSnapshot, SnapshotPolicy,
    SnapshotStore, VersionCache,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub snapshot_policy: SnapshotPolicy,
    /// 聚合缓存空闲过期时间，`None` 表示不过期
    pub aggregate_cache_ttl: Option<Duration>,
    pub version_cache_shards: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            snapshot_policy: SnapshotPolicy::Never,
            aggregate_cache_ttl: Some(Duration::from_secs(300)),
            version_cache_shards: DEFAULT_SHARDS,
        }
    }
}

pub struct Repository {
    events: EventStore,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    publisher: EventPublisher,
    cache: AggregateCache,
    upcasters: EventUpcasterChain,
    config: RepositoryConfig,
}

#[bon::bon]
impl Repository {
    #[builder]
    pub fn new(
        event_storage: Arc<dyn EventStorage>,
        snapshot_store: Option<Arc<dyn SnapshotStore>>,
        publisher: EventPublisher,
        #[builder(default)] upcasters: EventUpcasterChain,
        #[builder(default)] config: RepositoryConfig,
    ) -> Self {
        Self {
            events: EventStore::with_version_cache(
                event_storage,
                VersionCache::new(config.version_cache_shards),
            ),
            snapshots: snapshot_store,
            publisher,
            cache: AggregateCache::new(config.aggregate_cache_ttl),
            upcasters,
            config,
        }
    }
}

impl Repository {
    pub fn event_store(&self) -> &EventStore {
        &self.events
    }

    pub fn cache(&self) -> &AggregateCache {
        &self.cache
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// 加载聚合；不存在任何历史时返回版本 0 的新实例
    pub async fn find<A: Aggregate>(&self, id: &A::Id) -> Result<AggregateRoot<A>> {
        let key = AggregateKey::of::<A>(id);
        if let Some(root) = self.cache.get::<A>(&key) {
            return Ok(root);
        }

        let mut root = match self.load_snapshot::<A>(&key).await {
            Some(root) => root,
            None => AggregateRoot::new(id.clone()),
        };

        let batches = self.events.find_all(&key, root.version()).await?;
        root.load_from(&batches, &self.upcasters)?;

        self.cache.put(&root);
        Ok(root)
    }

    /// 快照读取失败视为没有快照
    async fn load_snapshot<A: Aggregate>(&self, key: &AggregateKey) -> Option<AggregateRoot<A>> {
        let store = self.snapshots.as_ref()?;
        match store.get_latest(key).await {
            Ok(Some(snapshot)) => match snapshot.to_root::<A>() {
                Ok(root) => Some(root),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "snapshot ignored: cannot restore");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "snapshot lookup failed");
                None
            }
        }
    }

    /// 保存聚合的待持久化事件
    ///
    /// 存储错误原样返回（版本冲突时调用方应重新加载并重试整个用例）；
    /// 发布与快照在提交之后进行，失败不影响已提交的事件。
    pub async fn save<A: Aggregate>(
        &self,
        root: &mut AggregateRoot<A>,
        correlation_id: &str,
    ) -> Result<()> {
        let Some(batch) = root.pending_batch(correlation_id)? else {
            return Ok(());
        };

        if let Err(err) = self.events.save(&batch).await {
            self.cache.remove(root.key());
            return Err(err);
        }

        root.mark_persisted();
        self.cache.put(root);
        self.publisher.spawn_publish(&batch);

        if self.config.snapshot_policy.should_snapshot(root.version()) {
            self.take_snapshot(root).await;
        }
        Ok(())
    }

    async fn take_snapshot<A: Aggregate>(&self, root: &AggregateRoot<A>) {
        let Some(store) = self.snapshots.as_ref() else {
            return;
        };
        let result = match SerializedSnapshot::from_root(root) {
            Ok(snapshot) => store.save(snapshot).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => tracing::debug!(key = %root.key(), version = %root.version(), "snapshot saved"),
            Err(err) => {
                tracing::warn!(key = %root.key(), version = %root.version(), error = %err, "snapshot save failed")
            }
        }
    }

    /// 删除聚合：先淘汰缓存，再删除快照与事件历史
    pub async fn delete<A: Aggregate>(&self, id: &A::Id) -> Result<()> {
        let key = AggregateKey::of::<A>(id);
        self.cache.remove(&key);
        if let Some(store) = &self.snapshots {
            store.remove(&key).await?;
        }
        self.events.remove_all(&key).await
    }

    /// 等待后台发布完成
    pub async fn flush(&self) {
        self.publisher.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::{Repository, RepositoryConfig};
    use crate::aggregate::tests::{Counter, CounterCommand};
    use crate::aggregate_key::AggregateKey;
    use crate::error::{DomainError, DomainResult};
    use crate::messaging::{EventPublisher, InMemoryMessageBus};
    use crate::persist::{
        InMemoryEventStorage, InMemorySnapshotStore, SerializedSnapshot, SnapshotPolicy,
        SnapshotStore,
    };
    use crate::retry::RetryConfig;
    use crate::value_object::Version;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct BrokenSnapshots;

    #[async_trait]
    impl SnapshotStore for BrokenSnapshots {
        async fn get_latest(&self, _: &AggregateKey) -> DomainResult<Option<SerializedSnapshot>> {
            Err(DomainError::snapshot_store("disk gone"))
        }

        async fn save(&self, _: SerializedSnapshot) -> DomainResult<()> {
            Err(DomainError::snapshot_store("disk gone"))
        }

        async fn remove(&self, _: &AggregateKey) -> DomainResult<()> {
            Ok(())
        }
    }

    fn repository(snapshots: Arc<dyn SnapshotStore>, policy: SnapshotPolicy) -> Repository {
        Repository::builder()
            .event_storage(Arc::new(InMemoryEventStorage::default()))
            .snapshot_store(snapshots)
            .publisher(EventPublisher::new(
                Arc::new(InMemoryMessageBus::default()),
                RetryConfig::none(),
            ))
            .config(RepositoryConfig {
                snapshot_policy: policy,
                ..Default::default()
            })
            .build()
    }

    #[tokio::test]
    async fn unknown_aggregate_is_fresh() {
        let repo = repository(Arc::new(InMemorySnapshotStore::default()), SnapshotPolicy::Never);
        let root = repo.find::<Counter>(&"nobody".to_string()).await.unwrap();
        assert!(root.version().is_new());
        assert_eq!(root.state().value, 0);
    }

    #[tokio::test]
    async fn save_without_pending_events_is_noop() {
        let repo = repository(Arc::new(InMemorySnapshotStore::default()), SnapshotPolicy::Never);
        let mut root = repo.find::<Counter>(&"c-1".to_string()).await.unwrap();
        repo.save(&mut root, "cmd").await.unwrap();
        assert!(
            repo.event_store()
                .find_all(root.key(), Version::new())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn snapshot_is_taken_by_policy_and_used_on_reload() {
        let snapshots = Arc::new(InMemorySnapshotStore::default());
        let repo = repository(snapshots.clone(), SnapshotPolicy::Every(2));
        let id = "c-1".to_string();

        for n in 1..=3 {
            let mut root = repo.find::<Counter>(&id).await.unwrap();
            root.execute(CounterCommand::Add(n)).unwrap();
            repo.save(&mut root, &format!("cmd-{n}")).await.unwrap();
        }

        let key = AggregateKey::of::<Counter>(&id);
        let snapshot = snapshots.get_latest(&key).await.unwrap().unwrap();
        assert_eq!(snapshot.version(), Version::from_value(2));

        // 绕过缓存：快照 v2 + 事件 v3
        repo.cache().remove(&key);
        let root = repo.find::<Counter>(&id).await.unwrap();
        assert_eq!(root.version(), Version::from_value(3));
        assert_eq!(root.state().value, 6);
    }

    #[tokio::test]
    async fn broken_snapshot_store_is_not_fatal() {
        let repo = repository(Arc::new(BrokenSnapshots), SnapshotPolicy::Every(1));
        let id = "c-1".to_string();

        let mut root = repo.find::<Counter>(&id).await.unwrap();
        root.execute(CounterCommand::Add(4)).unwrap();
        repo.save(&mut root, "cmd-1").await.unwrap();

        repo.cache().remove(root.key());
        let reloaded = repo.find::<Counter>(&id).await.unwrap();
        assert_eq!(reloaded.state().value, 4);
        assert_eq!(reloaded.version(), Version::from_value(1));
    }

    #[tokio::test]
    async fn conflicting_save_evicts_cache_and_propagates() {
        let repo = repository(Arc::new(InMemorySnapshotStore::default()), SnapshotPolicy::Never);
        let id = "c-1".to_string();

        let mut a = repo.find::<Counter>(&id).await.unwrap();
        let mut b = repo.find::<Counter>(&id).await.unwrap();
        a.execute(CounterCommand::Add(1)).unwrap();
        b.execute(CounterCommand::Add(2)).unwrap();

        repo.save(&mut a, "cmd-a").await.unwrap();
        let err = repo.save(&mut b, "cmd-b").await.unwrap_err();
        assert!(err.is_conflict());
        assert!(repo.cache().is_empty());

        let reloaded = repo.find::<Counter>(&id).await.unwrap();
        assert_eq!(reloaded.state().value, 1);
    }

    #[tokio::test]
    async fn delete_removes_everything() {
        let snapshots = Arc::new(InMemorySnapshotStore::default());
        let repo = repository(snapshots.clone(), SnapshotPolicy::Every(1));
        let id = "c-1".to_string();

        let mut root = repo.find::<Counter>(&id).await.unwrap();
        root.execute(CounterCommand::Add(1)).unwrap();
        repo.save(&mut root, "cmd-1").await.unwrap();
        assert_eq!(snapshots.len(), 1);

        repo.delete::<Counter>(&id).await.unwrap();
        assert!(snapshots.is_empty());
        assert!(repo.cache().is_empty());

        let fresh = repo.find::<Counter>(&id).await.unwrap();
        assert!(fresh.version().is_new());
    }
}
