//! CQRS/事件溯源运行时的领域层核心（cqrs-domain）
//!
//! 提供事件溯源运行时所需的核心构件：
//! - 聚合（`aggregate`）、聚合根（`aggregate_root`）与聚合键（`aggregate_key`）
//! - 领域事件与事件批次（`domain_event`）、事件上抬（`event_upcaster`）
//! - 带版本校验的事件存储、快照与聚合仓储（`persist`）
//! - 信封、有界信封队列、后台工作单元与消息总线边界（`messaging`）
//! - 有界重试（`retry`）
//!
//! 存储与消息中间件以 trait 形式定义边界（`EventStorage`、`SnapshotStore`、`MessageBus`），
//! 并附带内存实现，便于测试与本地运行。
//!
//! 典型用法：
//! 1. 用 `#[entity]`/`#[domain_event]` 定义聚合状态与事件，实现 `Aggregate`；
//! 2. 组装 `EventStore`、`SnapshotStore` 与 `EventPublisher`，构建 `Repository`；
//! 3. 通过 `Repository::find` 取得 `AggregateRoot`，执行命令后 `Repository::save`。
//!
pub mod aggregate;
pub mod aggregate_key;
pub mod aggregate_root;
pub mod domain_event;
pub mod entity;
pub mod error;
pub mod event_upcaster;
pub mod messaging;
pub mod persist;
pub mod retry;
pub mod value_object;

// 允许在本 crate 内部通过 ::cqrs_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::cqrs_domain 路径。
extern crate self as cqrs_domain;
