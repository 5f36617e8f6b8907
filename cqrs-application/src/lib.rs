//! 应用层：命令、消息处理器与调度
//!
//! - [`dispatcher::Dispatcher`] 解析处理器并执行“幂等 → 重试 → 通知 → 处理器”调用链；
//! - [`handler_record`] 提供处理器执行记录（去重账本）；
//! - [`pipeline::ProcessingPipeline`] 把信封队列、Worker 与调度器连成流水线。
//!
pub mod command;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod handler;
pub mod handler_record;
pub mod handler_record_batching;
pub mod pipeline;
pub mod registry;

pub use dispatcher::{Dispatcher, DispatcherConfig, Execution};
pub use pipeline::{PipelineConfig, ProcessingPipeline};
