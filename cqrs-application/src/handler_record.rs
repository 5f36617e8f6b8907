//! 处理器执行记录（HandlerRecord）
//!
//! `(message_id, message_type, handler_type)` 三元组构成去重账本：
//! 记录存在即表示该处理器已成功处理过这条消息，重复投递时直接跳过。
//! 内存实现在保留窗口后过期，持久实现见 [`crate::handler_record_batching`]。
//!
use async_trait::async_trait;
use cqrs_domain::error::DomainResult as Result;
use cqrs_domain::messaging::Message;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerRecord {
    message_id: String,
    message_type: String,
    handler_type: String,
}

impl HandlerRecord {
    pub fn new(
        message_id: impl Into<String>,
        message_type: impl Into<String>,
        handler_type: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            message_type: message_type.into(),
            handler_type: handler_type.into(),
        }
    }

    pub fn for_message(message: &Message, handler_type: &str) -> Self {
        Self::new(message.message_id(), message.message_type(), handler_type)
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn handler_type(&self) -> &str {
        &self.handler_type
    }
}

#[async_trait]
pub trait HandlerRecordStore: Send + Sync {
    /// 纯成员判断，不产生副作用
    async fn is_executed(&self, record: &HandlerRecord) -> Result<bool>;
    /// 记录一次成功处理
    async fn add(&self, record: HandlerRecord) -> Result<()>;
}

#[async_trait]
impl<T> HandlerRecordStore for Arc<T>
where
    T: HandlerRecordStore + ?Sized,
{
    async fn is_executed(&self, record: &HandlerRecord) -> Result<bool> {
        (**self).is_executed(record).await
    }

    async fn add(&self, record: HandlerRecord) -> Result<()> {
        (**self).add(record).await
    }
}

/// 执行记录配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HandlerRecordConfig {
    /// 内存记录的保留窗口，需大于端到端重投的最大延迟
    pub retention: Duration,
    /// 批量写入的条数阈值
    pub max_batch: usize,
    /// 批量写入的时间阈值
    pub flush_interval: Duration,
}

impl Default for HandlerRecordConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(24 * 60 * 60),
            max_batch: 100,
            flush_interval: Duration::from_secs(1),
        }
    }
}

/// 基于内存的执行记录，条目在保留窗口后过期
pub struct InMemoryHandlerRecordStore {
    records: DashMap<HandlerRecord, Instant>,
    retention: Duration,
}

impl Default for InMemoryHandlerRecordStore {
    fn default() -> Self {
        Self::new(HandlerRecordConfig::default().retention)
    }
}

impl InMemoryHandlerRecordStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            records: DashMap::new(),
            retention,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 清理过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let before = self.records.len();
        let retention = self.retention;
        self.records
            .retain(|_, recorded_at| recorded_at.elapsed() < retention);
        let purged = before.saturating_sub(self.records.len());
        if purged > 0 {
            tracing::debug!(purged, "expired handler records purged");
        }
        purged
    }
}

#[async_trait]
impl HandlerRecordStore for InMemoryHandlerRecordStore {
    async fn is_executed(&self, record: &HandlerRecord) -> Result<bool> {
        let retention = self.retention;
        let expired = self
            .records
            .remove_if(record, |_, recorded_at| recorded_at.elapsed() >= retention)
            .is_some();
        Ok(!expired && self.records.contains_key(record))
    }

    async fn add(&self, record: HandlerRecord) -> Result<()> {
        self.records.insert(record, Instant::now());
        Ok(())
    }
}
