//! 领域层统一错误定义
//!
//! 聚焦序列化/上抬、版本冲突、重建一致性、存储与消息边界等最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化/事件上抬 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("upcast failed: type={event_type}, from_version={from_version}, reason={reason}")]
    UpcastFailed {
        event_type: String,
        from_version: usize,
        reason: String,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 事件存储/一致性 ---
    #[error("invalid batch: key={key}, reason={reason}")]
    InvalidBatch { key: String, reason: String },
    #[error("version conflict: key={key}, expected={expected}, actual={actual}")]
    VersionConflict {
        key: String,
        expected: usize,
        actual: usize,
    },
    #[error("rehydration inconsistency: key={key}, reason={reason}")]
    RehydrationInconsistency { key: String, reason: String },

    // --- 基础设施边界 ---
    #[error("event store error: {reason}")]
    EventStore { reason: String },
    #[error("snapshot store error: {reason}")]
    SnapshotStore { reason: String },
    #[error("message bus error: {reason}")]
    MessageBus { reason: String },
    #[error("queue closed: {queue}")]
    QueueClosed { queue: String },

    // --- 业务 ---
    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    // --- 通用 ---
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
}

impl DomainError {
    pub fn message_bus(reason: impl Into<String>) -> Self {
        Self::MessageBus {
            reason: reason.into(),
        }
    }

    pub fn event_store(reason: impl Into<String>) -> Self {
        Self::EventStore {
            reason: reason.into(),
        }
    }

    pub fn snapshot_store(reason: impl Into<String>) -> Self {
        Self::SnapshotStore {
            reason: reason.into(),
        }
    }

    /// 是否为乐观并发冲突（调用方应重新加载聚合并重试整个用例）
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

