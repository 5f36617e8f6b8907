//! 聚合缓存
//!
//! 进程内按 `AggregateKey` 缓存已持久化的聚合根，读取时返回克隆，
//! 调用方之间不共享可变状态。可选的空闲过期时间在读取时惰性淘汰，
//! 也可通过 `evict_expired` 主动清理。
//!
use crate::aggregate::Aggregate;
use crate::aggregate_key::AggregateKey;
use crate::aggregate_root::AggregateRoot;
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct CacheEntry {
    root: Arc<dyn Any + Send + Sync>,
    touched_at: Instant,
}

#[derive(Default)]
pub struct AggregateCache {
    entries: DashMap<AggregateKey, CacheEntry>,
    ttl: Option<Duration>,
}

impl AggregateCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(entry.touched_at) > ttl)
    }

    pub fn get<A: Aggregate>(&self, key: &AggregateKey) -> Option<AggregateRoot<A>> {
        let now = Instant::now();
        if self
            .entries
            .remove_if(key, |_, entry| self.is_expired(entry, now))
            .is_some()
        {
            tracing::debug!(key = %key, "aggregate cache entry expired");
            return None;
        }

        let mut entry = self.entries.get_mut(key)?;
        entry.touched_at = now;
        entry.root.downcast_ref::<AggregateRoot<A>>().cloned()
    }

    /// 缓存聚合根，仅接受没有待持久化事件的实例
    pub fn put<A: Aggregate>(&self, root: &AggregateRoot<A>) {
        if root.has_pending() {
            return;
        }
        self.entries.insert(
            root.key().clone(),
            CacheEntry {
                root: Arc::new(root.clone()),
                touched_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &AggregateKey) {
        self.entries.remove(key);
    }

    /// 清理全部过期条目，返回清理数量
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
