//! 事件持久化模型（SerializedEvent）
//!
//! 单个事件在存储与总线上的标准形态：类型名、载荷版本与 JSON 载荷。
//!
use crate::domain_event::DomainEvent;
use crate::error::DomainResult;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// 事件唯一标识符
    #[builder(default = Uuid::new_v4().to_string(), into)]
    event_id: String,
    /// 事件类型，用于区分不同的事件
    #[builder(into)]
    event_type: String,
    /// 事件载荷版本，用于版本控制和上抬
    #[builder(default = 1)]
    event_version: usize,
    /// 事件负载
    payload: Value,
}

impl SerializedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> usize {
        self.event_version
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// 序列化领域事件，分配新的事件标识
    pub fn from_event<E: DomainEvent>(event: &E) -> DomainResult<Self> {
        Ok(Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: event.event_type().to_string(),
            event_version: event.event_version(),
            payload: serde_json::to_value(event)?,
        })
    }

    /// 反序列化为领域事件（调用方应先完成上抬）
    pub fn to_event<E: DomainEvent>(&self) -> DomainResult<E> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}
