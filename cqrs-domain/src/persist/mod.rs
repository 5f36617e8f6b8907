//! 持久化
//!
//! - `EventStorage` / `SnapshotStore`：持久化适配器边界；
//! - `EventStore`：带版本缓存的乐观并发校验；
//! - `Repository`：缓存优先的聚合加载、保存与删除；
//! - 内存实现：`InMemoryEventStorage`、`InMemorySnapshotStore`。

mod aggregate_cache;
mod event_store;
mod inmemory;
mod repository;
mod snapshot;
mod version_cache;

pub use aggregate_cache::AggregateCache;
pub use event_store::{EventStorage, EventStore};
pub use inmemory::{InMemoryEventStorage, InMemorySnapshotStore};
pub use repository::{Repository, RepositoryConfig};
pub use snapshot::{SerializedSnapshot, SnapshotPolicy, SnapshotStore};
pub use version_cache::{DEFAULT_SHARDS, VersionCache};
