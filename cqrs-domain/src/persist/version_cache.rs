//! 版本缓存（VersionCache）
//!
//! 按 `AggregateKey::stable_hash` 分片的进程内缓存，记录每个聚合最近一次
//! 被接受的版本，用于在访问存储前短路乐观并发校验。缓存只是加速手段，
//! 未命中时总是回退到存储。
//!
use crate::aggregate_key::AggregateKey;
use crate::value_object::Version;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

pub const DEFAULT_SHARDS: usize = 10;

#[derive(Debug)]
pub struct VersionCache {
    shards: Vec<RwLock<HashMap<AggregateKey, Version>>>,
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl VersionCache {
    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| RwLock::default()).collect(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, key: &AggregateKey) -> &RwLock<HashMap<AggregateKey, Version>> {
        &self.shards[key.shard(self.shards.len())]
    }

    pub fn get(&self, key: &AggregateKey) -> Option<Version> {
        self.shard(key)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    /// 记录已接受的版本，只前进不后退
    pub fn advance(&self, key: &AggregateKey, version: Version) {
        let mut shard = self.shard(key).write().unwrap_or_else(PoisonError::into_inner);
        let entry = shard.entry(key.clone()).or_default();
        if version > *entry {
            *entry = version;
        }
    }

    pub fn remove(&self, key: &AggregateKey) {
        self.shard(key)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::VersionCache;
    use crate::aggregate_key::AggregateKey;
    use crate::value_object::Version;
    use std::sync::Arc;

    #[test]
    fn advance_is_monotonic() {
        let cache = VersionCache::default();
        let key = AggregateKey::new("Account", "bank", "a-1");

        assert_eq!(cache.get(&key), None);
        cache.advance(&key, Version::from_value(2));
        cache.advance(&key, Version::from_value(1));
        assert_eq!(cache.get(&key), Some(Version::from_value(2)));

        cache.remove(&key);
        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn zero_shards_falls_back_to_one() {
        let cache = VersionCache::new(0);
        assert_eq!(cache.shard_count(), 1);
    }

    #[test]
    fn concurrent_advances_keep_highest() {
        let cache = Arc::new(VersionCache::new(4));
        let handles: Vec<_> = (1..=8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let key = AggregateKey::new("Account", "bank", format!("a-{i}"));
                        cache.advance(&key, Version::from_value(t));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.len(), 50);
        let key = AggregateKey::new("Account", "bank", "a-7");
        assert_eq!(cache.get(&key), Some(Version::from_value(8)));
    }
}
