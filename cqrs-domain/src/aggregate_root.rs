//! 聚合根（AggregateRoot）
//!
//! 事件溯源下的聚合实例：聚合状态 + 已持久化版本 + 待持久化事件。
//! - 命令通过 `execute` 产生事件并立即应用到状态，同时进入待持久化列表；
//! - 一次用例（两次保存之间）产生的全部事件共享一个版本号；
//! - 通过 `load_from` 回放历史批次重建状态，批次必须属于同一聚合且版本连续。
//!
use crate::aggregate::Aggregate;
use crate::aggregate_key::AggregateKey;
use crate::domain_event::EventBatch;
use crate::error::{DomainError, DomainResult};
use crate::event_upcaster::EventUpcasterChain;
use crate::value_object::Version;

#[derive(Debug, Clone)]
pub struct AggregateRoot<A: Aggregate> {
    key: AggregateKey,
    state: A,
    version: Version,
    pending: Vec<A::Event>,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// 全新实例（版本 0）
    pub fn new(id: A::Id) -> Self {
        Self {
            key: AggregateKey::of::<A>(&id),
            state: A::new(id),
            version: Version::new(),
            pending: Vec::new(),
        }
    }

    /// 由已有状态与版本构造（快照恢复）
    pub fn from_state(state: A, version: Version) -> Self {
        Self {
            key: AggregateKey::of::<A>(state.id()),
            state,
            version,
            pending: Vec::new(),
        }
    }

    pub fn key(&self) -> &AggregateKey {
        &self.key
    }

    pub fn id(&self) -> &A::Id {
        self.state.id()
    }

    pub fn state(&self) -> &A {
        &self.state
    }

    /// 当前版本（含待持久化批次）
    pub fn version(&self) -> Version {
        self.version
    }

    /// 最近一次持久化后的版本
    pub fn persisted_version(&self) -> Version {
        if self.pending.is_empty() {
            self.version
        } else {
            self.version.previous().unwrap_or_default()
        }
    }

    pub fn pending_events(&self) -> &[A::Event] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// 执行命令：产生的事件逐个 `raise`
    pub fn execute(&mut self, command: A::Command) -> Result<&[A::Event], A::Error> {
        let events = self.state.execute(command)?;
        let start = self.pending.len();
        for event in events {
            self.raise(event);
        }
        Ok(&self.pending[start..])
    }

    /// 记录新事件：应用到状态并加入待持久化列表，
    /// 本用例的第一个事件将版本推进一位
    pub fn raise(&mut self, event: A::Event) {
        if self.pending.is_empty() {
            self.version = self.version.next();
        }
        self.state.apply(&event);
        self.pending.push(event);
    }

    /// 仅应用事件到状态（回放）
    pub fn apply_event(&mut self, event: &A::Event) {
        self.state.apply(event);
    }

    /// 回放前校验：批次属于本聚合且版本恰为当前版本 + 1
    pub fn check_batch(&self, batch: &EventBatch) -> DomainResult<()> {
        if batch.key() != &self.key {
            return Err(DomainError::RehydrationInconsistency {
                key: self.key.to_string(),
                reason: format!("batch belongs to {}", batch.key()),
            });
        }
        if !batch.version().follows(self.version) {
            return Err(DomainError::RehydrationInconsistency {
                key: self.key.to_string(),
                reason: format!(
                    "expected version {}, found {}",
                    self.version.next(),
                    batch.version()
                ),
            });
        }
        Ok(())
    }

    /// 回放单个批次
    pub fn replay(&mut self, batch: &EventBatch, upcasters: &EventUpcasterChain) -> DomainResult<()> {
        if self.has_pending() {
            return Err(DomainError::InvalidState {
                reason: format!("{} has unsaved events, cannot replay history", self.key),
            });
        }
        self.check_batch(batch)?;
        for event in batch.decode::<A::Event>(upcasters)? {
            self.apply_event(&event);
        }
        self.version = batch.version();
        Ok(())
    }

    /// 按顺序回放历史批次
    pub fn load_from<'a, I>(&mut self, batches: I, upcasters: &EventUpcasterChain) -> DomainResult<()>
    where
        I: IntoIterator<Item = &'a EventBatch>,
    {
        batches
            .into_iter()
            .try_for_each(|batch| self.replay(batch, upcasters))
    }

    /// 将待持久化事件组装为批次，无待持久化事件时返回 `None`
    pub fn pending_batch(&self, correlation_id: &str) -> DomainResult<Option<EventBatch>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        EventBatch::from_events(self.key.clone(), self.version, correlation_id, &self.pending)
            .map(Some)
    }

    /// 持久化成功后清空待持久化事件，返回被清空的事件
    pub fn mark_persisted(&mut self) -> Vec<A::Event> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::AggregateRoot;
    use crate::aggregate::tests::{Counter, CounterCommand, CounterEvent};
    use crate::aggregate_key::AggregateKey;
    use crate::domain_event::EventBatch;
    use crate::error::DomainError;
    use crate::event_upcaster::EventUpcasterChain;
    use crate::value_object::Version;

    fn batch(id: &str, version: usize, amount: i64) -> EventBatch {
        EventBatch::from_events(
            AggregateKey::of::<Counter>(&id.to_string()),
            Version::from_value(version),
            "cmd",
            &[CounterEvent::Added { amount }],
        )
        .unwrap()
    }

    #[test]
    fn one_version_per_use_case() {
        let mut root = AggregateRoot::<Counter>::new("c-1".into());
        assert!(root.version().is_new());

        root.execute(CounterCommand::Add(1)).unwrap();
        root.execute(CounterCommand::Add(2)).unwrap();
        assert_eq!(root.version(), Version::from_value(1));
        assert_eq!(root.persisted_version(), Version::new());
        assert_eq!(root.pending_events().len(), 2);
        assert_eq!(root.state().value, 3);

        let batch = root.pending_batch("cmd-1").unwrap().unwrap();
        assert_eq!(batch.version(), Version::from_value(1));
        assert_eq!(batch.len(), 2);

        assert_eq!(root.mark_persisted().len(), 2);
        assert!(root.pending_batch("cmd-2").unwrap().is_none());

        root.execute(CounterCommand::Sub(1)).unwrap();
        assert_eq!(root.version(), Version::from_value(2));
    }

    #[test]
    fn failed_command_raises_nothing() {
        let mut root = AggregateRoot::<Counter>::new("c-1".into());
        assert!(root.execute(CounterCommand::Sub(5)).is_err());
        assert!(!root.has_pending());
        assert!(root.version().is_new());
    }

    #[test]
    fn load_from_replays_consecutive_batches() {
        let mut root = AggregateRoot::<Counter>::new("c-1".into());
        let history = vec![batch("c-1", 1, 1), batch("c-1", 2, 10)];

        root.load_from(&history, &EventUpcasterChain::default()).unwrap();
        assert_eq!(root.version(), Version::from_value(2));
        assert_eq!(root.state().value, 11);
        assert!(!root.has_pending());
    }

    #[test]
    fn load_from_rejects_gap_and_foreign_key() {
        let chain = EventUpcasterChain::default();

        let mut root = AggregateRoot::<Counter>::new("c-1".into());
        let err = root
            .load_from(&[batch("c-1", 1, 1), batch("c-1", 3, 1)], &chain)
            .unwrap_err();
        assert!(matches!(err, DomainError::RehydrationInconsistency { .. }));

        let mut root = AggregateRoot::<Counter>::new("c-1".into());
        let err = root.load_from(&[batch("c-2", 1, 1)], &chain).unwrap_err();
        assert!(matches!(err, DomainError::RehydrationInconsistency { .. }));
    }
}
