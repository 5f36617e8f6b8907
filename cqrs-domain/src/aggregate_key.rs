//! 聚合键（AggregateKey）
//!
//! 以“命名空间 + 类型名 + 实例标识”唯一确定一个聚合实例，
//! 并提供跨进程稳定的哈希值，用于版本缓存分片与缓存键。
//!
use crate::aggregate::Aggregate;
use crate::entity::Entity;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 聚合实例标识（结构相等）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateKey {
    type_name: String,
    namespace: String,
    id: String,
}

impl AggregateKey {
    pub fn new(
        type_name: impl Into<String>,
        namespace: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            namespace: namespace.into(),
            id: id.into(),
        }
    }

    /// 由聚合类型与标识构造
    pub fn of<A: Aggregate>(id: &<A as Entity>::Id) -> Self {
        Self::new(A::TYPE, A::NAMESPACE, id.to_string())
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 带命名空间的类型名：`namespace.type_name`，无命名空间时即 `type_name`
    pub fn qualified_type(&self) -> String {
        qualify(&self.namespace, &self.type_name)
    }

    /// 聚合类型 `A` 的带命名空间类型名，即其事件流消息的类型码
    pub fn qualified_type_of<A: Aggregate>() -> String {
        qualify(A::NAMESPACE, A::TYPE)
    }

    /// 是否属于聚合类型 `A`
    pub fn is_for<A: Aggregate>(&self) -> bool {
        self.type_name == A::TYPE && self.namespace == A::NAMESPACE
    }

    /// 稳定哈希：对规范字符串取 SHA-256，截取前 8 字节（大端）
    ///
    /// 与 `std::hash::Hash` 不同，该值与进程、运行次数无关。
    pub fn stable_hash(&self) -> u64 {
        let digest = Sha256::digest(self.to_string().as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }

    /// 分片下标，`shards` 为 0 时按 1 处理
    pub fn shard(&self, shards: usize) -> usize {
        (self.stable_hash() % shards.max(1) as u64) as usize
    }
}

fn qualify(namespace: &str, type_name: &str) -> String {
    if namespace.is_empty() {
        type_name.to_string()
    } else {
        format!("{namespace}.{type_name}")
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.qualified_type(), self.id)
    }
}
