//! 聚合（Aggregate）抽象
//!
//! 约束一个聚合的核心行为：
//! - `execute` 将命令转换为事件（不改变状态）；
//! - `apply` 将事件投影到状态（改变状态）；
//! - 通过 `Entity` 约束聚合具备标识，并以 `Entity::new` 作为重建时的工厂函数。
//!
use crate::domain_event::DomainEvent;
use crate::entity::Entity;
use serde::{Serialize, de::DeserializeOwned};
use std::error::Error;

/// 聚合状态接口
pub trait Aggregate:
    Entity + Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 聚合类型名
    const TYPE: &'static str;
    /// 命名空间（模块限定名），默认为空
    const NAMESPACE: &'static str = "";

    /// 该聚合支持的命令类型
    type Command;
    /// 该聚合产生的领域事件类型
    type Event: DomainEvent;
    /// 命令执行的错误类型
    type Error: Error + Send + Sync + 'static;

    /// 执行命令，返回产生的事件列表
    fn execute(&self, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// 应用事件，更新聚合状态
    fn apply(&mut self, event: &Self::Event);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::Aggregate;
    use crate::entity::Entity;
    use crate::error::DomainError;
    use cqrs_macros::{domain_event, entity};

    #[entity]
    pub(crate) struct Counter {
        pub(crate) value: i64,
    }

    #[derive(Debug)]
    pub(crate) enum CounterCommand {
        Add(i64),
        Sub(i64),
    }

    #[domain_event]
    pub(crate) enum CounterEvent {
        Added { amount: i64 },
        Subtracted { amount: i64 },
    }

    impl Aggregate for Counter {
        const TYPE: &'static str = "Counter";
        const NAMESPACE: &'static str = "test";

        type Command = CounterCommand;
        type Event = CounterEvent;
        type Error = DomainError;

        fn execute(&self, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
            match command {
                CounterCommand::Add(amount) if amount <= 0 => Err(DomainError::InvalidCommand {
                    reason: "amount must be > 0".into(),
                }),
                CounterCommand::Add(amount) => Ok(vec![CounterEvent::Added { amount }]),
                CounterCommand::Sub(amount) if self.value < amount => {
                    Err(DomainError::InvalidState {
                        reason: "insufficient".into(),
                    })
                }
                CounterCommand::Sub(amount) => Ok(vec![CounterEvent::Subtracted { amount }]),
            }
        }

        fn apply(&mut self, event: &Self::Event) {
            match event {
                CounterEvent::Added { amount } => self.value += amount,
                CounterEvent::Subtracted { amount } => self.value -= amount,
            }
        }
    }

    #[test]
    fn execute_does_not_mutate_and_apply_does() {
        let mut counter = Counter::new("c-1".to_string());
        let events = counter.execute(CounterCommand::Add(3)).unwrap();
        assert_eq!(counter.value, 0);

        for e in &events {
            counter.apply(e);
        }
        assert_eq!(counter.value, 3);
        assert_eq!(counter.id(), "c-1");
    }

    #[test]
    fn invalid_commands_should_error() {
        let counter = Counter::new("c-2".to_string());
        assert!(matches!(
            counter.execute(CounterCommand::Sub(1)),
            Err(DomainError::InvalidState { .. })
        ));
        assert!(matches!(
            counter.execute(CounterCommand::Add(0)),
            Err(DomainError::InvalidCommand { .. })
        ));
    }
}
