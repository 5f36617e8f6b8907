//! 事件批次（EventBatch）
//!
//! 一次用例产生的全部事件构成一个批次，批次是持久化与发布的最小单元：
//! 共享同一个聚合版本（应用该批次之后的版本）与同一个关联 ID，
//! 要么整体写入，要么整体拒绝。
//!
use crate::aggregate_key::AggregateKey;
use crate::domain_event::{DomainEvent, SerializedEvent};
use crate::error::{DomainError, DomainResult};
use crate::event_upcaster::EventUpcasterChain;
use crate::value_object::Version;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct EventBatch {
    #[builder(default = Uuid::new_v4().to_string(), into)]
    batch_id: String,
    key: AggregateKey,
    /// 应用本批次后的聚合版本
    version: Version,
    /// 产生本批次的命令/请求标识，可为空
    #[builder(default, into)]
    correlation_id: String,
    #[builder(default = Utc::now())]
    occurred_at: DateTime<Utc>,
    events: Vec<SerializedEvent>,
}

impl EventBatch {
    /// 由领域事件构造批次
    pub fn from_events<E: DomainEvent>(
        key: AggregateKey,
        version: Version,
        correlation_id: impl Into<String>,
        events: &[E],
    ) -> DomainResult<Self> {
        let events = events
            .iter()
            .map(SerializedEvent::from_event)
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(Self::builder()
            .key(key)
            .version(version)
            .correlation_id(correlation_id)
            .events(events)
            .build())
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn key(&self) -> &AggregateKey {
        &self.key
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn events(&self) -> &[SerializedEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<SerializedEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// 结构校验：非空且版本大于 0
    pub fn validate(&self) -> DomainResult<()> {
        if self.events.is_empty() {
            return Err(DomainError::InvalidBatch {
                key: self.key.to_string(),
                reason: "batch contains no events".into(),
            });
        }
        if self.version.is_new() {
            return Err(DomainError::InvalidBatch {
                key: self.key.to_string(),
                reason: "batch version must be >= 1".into(),
            });
        }
        Ok(())
    }

    /// 上抬并反序列化批次内全部事件
    pub fn decode<E: DomainEvent>(&self, upcasters: &EventUpcasterChain) -> DomainResult<Vec<E>> {
        upcasters
            .upcast_all(self.events.clone())?
            .iter()
            .map(SerializedEvent::to_event)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::EventBatch;
    use crate::aggregate::tests::{Counter, CounterEvent};
    use crate::aggregate_key::AggregateKey;
    use crate::error::DomainError;
    use crate::event_upcaster::EventUpcasterChain;
    use crate::value_object::Version;

    fn key() -> AggregateKey {
        AggregateKey::of::<Counter>(&"c-1".to_string())
    }

    #[test]
    fn from_events_preserves_order() {
        let events = vec![
            CounterEvent::Added { amount: 1 },
            CounterEvent::Subtracted { amount: 2 },
        ];
        let batch = EventBatch::from_events(key(), Version::from_value(1), "cmd-1", &events).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.correlation_id(), "cmd-1");
        assert_eq!(batch.events()[0].event_type(), "CounterEvent.Added");
        assert_eq!(batch.events()[1].event_type(), "CounterEvent.Subtracted");

        let decoded: Vec<CounterEvent> = batch.decode(&EventUpcasterChain::default()).unwrap();
        assert_eq!(decoded, events);
    }

    #[test]
    fn validate_rejects_empty_and_zero_version() {
        let empty = EventBatch::from_events::<CounterEvent>(key(), Version::from_value(1), "", &[])
            .unwrap();
        assert!(matches!(empty.validate(), Err(DomainError::InvalidBatch { .. })));

        let zero = EventBatch::from_events(
            key(),
            Version::new(),
            "",
            &[CounterEvent::Added { amount: 1 }],
        )
        .unwrap();
        assert!(matches!(zero.validate(), Err(DomainError::InvalidBatch { .. })));
    }
}
