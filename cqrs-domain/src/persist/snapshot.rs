//! 快照（Snapshot）
//!
//! 快照是聚合状态在某个版本上的物化副本，仅用于缩短回放，
//! 从不影响正确性：禁用快照时仓储依然完整可用。
//!
use crate::aggregate::Aggregate;
use crate::aggregate_key::AggregateKey;
use crate::aggregate_root::AggregateRoot;
use crate::error::{DomainError, DomainResult as Result};
use crate::value_object::Version;
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct SerializedSnapshot {
    key: AggregateKey,
    version: Version,
    payload: Value,
    #[builder(default = Utc::now())]
    taken_at: DateTime<Utc>,
}

impl SerializedSnapshot {
    pub fn key(&self) -> &AggregateKey {
        &self.key
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// 从聚合根创建快照（仅包含已持久化的状态）
    pub fn from_root<A: Aggregate>(root: &AggregateRoot<A>) -> Result<Self> {
        if root.has_pending() {
            return Err(DomainError::InvalidState {
                reason: format!("{} has unsaved events, cannot snapshot", root.key()),
            });
        }
        Ok(Self {
            key: root.key().clone(),
            version: root.version(),
            payload: serde_json::to_value(root.state())?,
            taken_at: Utc::now(),
        })
    }

    /// 将快照恢复为聚合根
    pub fn to_root<A: Aggregate>(&self) -> Result<AggregateRoot<A>> {
        if !self.key.is_for::<A>() {
            return Err(DomainError::TypeMismatch {
                expected: AggregateKey::new(A::TYPE, A::NAMESPACE, "").qualified_type(),
                found: self.key.qualified_type(),
            });
        }

        let state: A = serde_json::from_value(self.payload.clone())?;
        Ok(AggregateRoot::from_state(state, self.version))
    }
}

/// 快照持久化适配器
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// 最高版本的快照
    async fn get_latest(&self, key: &AggregateKey) -> Result<Option<SerializedSnapshot>>;

    async fn save(&self, snapshot: SerializedSnapshot) -> Result<()>;

    async fn remove(&self, key: &AggregateKey) -> Result<()>;
}

#[async_trait]
impl<T> SnapshotStore for Arc<T>
where
    T: SnapshotStore + ?Sized,
{
    async fn get_latest(&self, key: &AggregateKey) -> Result<Option<SerializedSnapshot>> {
        (**self).get_latest(key).await
    }

    async fn save(&self, snapshot: SerializedSnapshot) -> Result<()> {
        (**self).save(snapshot).await
    }

    async fn remove(&self, key: &AggregateKey) -> Result<()> {
        (**self).remove(key).await
    }
}

/// 快照策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPolicy {
    #[default]
    Never,
    /// 每 N 个版本落一次快照
    Every(usize),
}

impl SnapshotPolicy {
    pub fn should_snapshot(&self, version: Version) -> bool {
        match self {
            SnapshotPolicy::Never => false,
            SnapshotPolicy::Every(interval) => {
                let interval = (*interval).max(1);
                !version.is_new() && version.value().is_multiple_of(interval)
            }
        }
    }
}
