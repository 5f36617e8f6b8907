//! 事件上抬（Event Upcasting）
//!
//! 当事件载荷结构演进时，通过上抬器（`EventUpcaster`）在回放路径对旧事件进行
//! 逐步转换（拆分/重命名/丢弃等），`EventUpcasterChain` 串联多个阶段，
//! 反复执行直到没有阶段再命中为止。
//!
use crate::domain_event::SerializedEvent;
use crate::error::{DomainError, DomainResult as Result};
use std::sync::Arc;

/// 单轮上抬最多执行的轮数，超过即认为上抬器配置有误（例如未提升版本）
const MAX_ROUNDS: usize = 32;

/// 事件版本升级器
pub trait EventUpcaster: Send + Sync {
    fn applies(&self, event_type: &str, event_version: usize) -> bool;

    fn upcast(&self, event: SerializedEvent) -> Result<EventUpcasterResult>;
}

impl<T> EventUpcaster for Arc<T>
where
    T: EventUpcaster + ?Sized,
{
    fn applies(&self, event_type: &str, event_version: usize) -> bool {
        (**self).applies(event_type, event_version)
    }

    fn upcast(&self, event: SerializedEvent) -> Result<EventUpcasterResult> {
        (**self).upcast(event)
    }
}

/// 升级结果：单个、拆分为多个、或丢弃
#[allow(clippy::large_enum_variant)]
pub enum EventUpcasterResult {
    One(SerializedEvent),
    Many(Vec<SerializedEvent>),
    Drop,
}

impl EventUpcasterResult {
    fn into_events(self) -> Vec<SerializedEvent> {
        match self {
            Self::One(e) => vec![e],
            Self::Many(v) => v,
            Self::Drop => vec![],
        }
    }
}

/// 事件升级链：按注册顺序应用多个 Upcaster
#[derive(Clone, Default)]
pub struct EventUpcasterChain {
    stages: Vec<Arc<dyn EventUpcaster>>,
}

impl EventUpcasterChain {
    pub fn with(mut self, stage: impl EventUpcaster + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// 对一批事件进行升级，直到不再有阶段命中
    pub fn upcast_all(&self, mut events: Vec<SerializedEvent>) -> Result<Vec<SerializedEvent>> {
        if self.stages.is_empty() {
            return Ok(events);
        }

        for _ in 0..MAX_ROUNDS {
            let (upcasted, changed) = self.upcast_round(events)?;
            if !changed {
                return Ok(upcasted);
            }
            events = upcasted;
        }

        let (event_type, from_version) = events
            .first()
            .map(|e| (e.event_type().to_string(), e.event_version()))
            .unwrap_or_default();
        Err(DomainError::UpcastFailed {
            event_type,
            from_version,
            reason: format!("upcasting did not converge after {MAX_ROUNDS} rounds"),
        })
    }

    fn upcast_round(&self, events: Vec<SerializedEvent>) -> Result<(Vec<SerializedEvent>, bool)> {
        let mut changed = false;
        let mut current = events;

        for stage in &self.stages {
            let mut next = Vec::with_capacity(current.len());
            for event in current {
                if stage.applies(event.event_type(), event.event_version()) {
                    changed = true;
                    next.extend(stage.upcast(event)?.into_events());
                } else {
                    next.push(event);
                }
            }
            current = next;
        }

        Ok((current, changed))
    }
}

impl FromIterator<Arc<dyn EventUpcaster>> for EventUpcasterChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn EventUpcaster>>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

impl Extend<Arc<dyn EventUpcaster>> for EventUpcasterChain {
    fn extend<I: IntoIterator<Item = Arc<dyn EventUpcaster>>>(&mut self, iter: I) {
        self.stages.extend(iter);
    }
}
