//! 领域事件（Domain Event）与事件批次
//!
//! 定义事件载荷需要实现的最小接口（`DomainEvent`）、事件的持久化形态
//! （`SerializedEvent`），以及作为持久化单元的 `EventBatch`。

mod domain_event_trait;
mod event_batch;
mod serialized_event;

pub use domain_event_trait::DomainEvent;
pub use event_batch::EventBatch;
pub use serialized_event::SerializedEvent;
