//! 消息流转
//!
//! - `Message`：命令、事件、事件流与结果四类消息；
//! - `Envelope` / `EnvelopeQueue`：带耗时统计的有界队列，`EnvelopeQueues` 按消息类型各建一个；
//! - `Worker` / `WorkerPool`：后台长驻循环；
//! - `MessageBus`：外部消息中间件边界，`EventPublisher` 负责提交后的异步发布。

mod bus;
mod bus_inmemory;
mod envelope;
mod message;
mod publisher;
mod queue;
mod worker;

pub use bus::MessageBus;
pub use bus_inmemory::InMemoryMessageBus;
pub use envelope::Envelope;
pub use message::{CommandMessage, CommandResult, EventMessage, Message, MessageKind};
pub use publisher::EventPublisher;
pub use queue::{EnvelopeQueue, EnvelopeQueues, QueueCompletion};
pub use worker::{Worker, WorkerDefinition, WorkerPool, WorkerState, panic_message};
