//! 消息处理器（MessageHandler）
//!
//! 调度器只认识类型擦除后的 [`MessageHandler`]；业务代码通常实现强类型的
//! [`CommandHandler`]、[`EventHandler`] 或 [`EventStreamHandler`]，
//! 注册时由适配器负责载荷解码。
//!
use crate::command::Command;
use crate::context::HandlerContext;
use crate::error::DispatchError;
use async_trait::async_trait;
use cqrs_domain::aggregate::Aggregate;
use cqrs_domain::aggregate_key::AggregateKey;
use cqrs_domain::domain_event::{DomainEvent, EventBatch};
use cqrs_domain::event_upcaster::EventUpcasterChain;
use cqrs_domain::messaging::{Message, MessageKind};
use std::marker::PhantomData;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandledTypes {
    One(String),
    Many(Vec<String>),
    All,
}

impl HandledTypes {
    pub fn matches(&self, message_type: &str) -> bool {
        match self {
            HandledTypes::One(t) => t == message_type,
            HandledTypes::Many(ts) => ts.iter().any(|t| t == message_type),
            HandledTypes::All => true,
        }
    }
}

/// 消息处理器：处理某一种类、某些类型码的消息
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// 处理器名称（幂等记录与日志使用，需在调度器内唯一且稳定）
    fn handler_name(&self) -> &str;
    /// 处理的消息种类
    fn kind(&self) -> MessageKind;
    /// 处理的消息类型码
    fn handled_types(&self) -> HandledTypes;
    async fn handle(&self, ctx: &HandlerContext, message: &Message) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: Command,
{
    async fn handle(&self, ctx: &HandlerContext, command: C) -> anyhow::Result<()>;
}

/// 单个领域事件的处理器
#[async_trait]
pub trait EventHandler<E>: Send + Sync
where
    E: DomainEvent,
{
    /// 订阅的事件类型码，如 `AccountEvent.Deposited`
    fn event_types(&self) -> HandledTypes;
    async fn handle(&self, ctx: &HandlerContext, key: &AggregateKey, event: E) -> anyhow::Result<()>;
}

/// 聚合事件流（一个批次）的处理器
#[async_trait]
pub trait EventStreamHandler<A>: Send + Sync
where
    A: Aggregate,
{
    async fn handle(
        &self,
        ctx: &HandlerContext,
        batch: &EventBatch,
        events: Vec<A::Event>,
    ) -> anyhow::Result<()>;
}

fn unexpected(expected: &str, message: &Message) -> DispatchError {
    DispatchError::Payload {
        message_type: expected.to_string(),
        reason: format!(
            "unexpected {} message of type {}",
            message.kind(),
            message.message_type()
        ),
    }
}

fn undecodable(message_type: &str, err: impl std::fmt::Display) -> DispatchError {
    DispatchError::Payload {
        message_type: message_type.to_string(),
        reason: err.to_string(),
    }
}

pub struct CommandAdapter<C, H> {
    name: String,
    handler: H,
    _marker: PhantomData<fn() -> C>,
}

impl<C, H> CommandAdapter<C, H> {
    pub fn new(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<C, H> MessageHandler for CommandAdapter<C, H>
where
    C: Command,
    H: CommandHandler<C>,
{
    fn handler_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MessageKind {
        MessageKind::Command
    }

    fn handled_types(&self) -> HandledTypes {
        HandledTypes::One(C::NAME.to_string())
    }

    async fn handle(&self, ctx: &HandlerContext, message: &Message) -> anyhow::Result<()> {
        let Message::Command(command) = message else {
            return Err(unexpected(C::NAME, message).into());
        };
        let command = command
            .decode::<C>()
            .map_err(|err| undecodable(C::NAME, err))?;
        self.handler.handle(ctx, command).await
    }
}

pub struct EventAdapter<E, H> {
    name: String,
    handler: H,
    _marker: PhantomData<fn() -> E>,
}

impl<E, H> EventAdapter<E, H> {
    pub fn new(name: impl Into<String>, handler: H) -> Self {
        Self {
            name: name.into(),
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<E, H> MessageHandler for EventAdapter<E, H>
where
    E: DomainEvent,
    H: EventHandler<E>,
{
    fn handler_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MessageKind {
        MessageKind::Event
    }

    fn handled_types(&self) -> HandledTypes {
        self.handler.event_types()
    }

    async fn handle(&self, ctx: &HandlerContext, message: &Message) -> anyhow::Result<()> {
        let Message::Event(event) = message else {
            return Err(unexpected(&ctx.message_type, message).into());
        };
        let payload = event
            .event()
            .to_event::<E>()
            .map_err(|err| undecodable(event.event().event_type(), err))?;
        self.handler.handle(ctx, event.key(), payload).await
    }
}

pub struct EventStreamAdapter<A, H> {
    name: String,
    handler: H,
    upcasters: EventUpcasterChain,
    _marker: PhantomData<fn() -> A>,
}

impl<A, H> EventStreamAdapter<A, H> {
    pub fn new(name: impl Into<String>, handler: H, upcasters: EventUpcasterChain) -> Self {
        Self {
            name: name.into(),
            handler,
            upcasters,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<A, H> MessageHandler for EventStreamAdapter<A, H>
where
    A: Aggregate,
    H: EventStreamHandler<A>,
{
    fn handler_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MessageKind {
        MessageKind::EventStream
    }

    fn handled_types(&self) -> HandledTypes {
        HandledTypes::One(AggregateKey::qualified_type_of::<A>())
    }

    async fn handle(&self, ctx: &HandlerContext, message: &Message) -> anyhow::Result<()> {
        let expected = AggregateKey::qualified_type_of::<A>();
        let batch = match message {
            Message::EventStream(batch) if batch.key().is_for::<A>() => batch,
            other => return Err(unexpected(&expected, other).into()),
        };
        let events = batch
            .decode::<A::Event>(&self.upcasters)
            .map_err(|err| undecodable(&expected, err))?;
        self.handler.handle(ctx, batch, events).await
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandAdapter, CommandHandler, HandledTypes, MessageHandler};
    use crate::command::Command;
    use crate::context::HandlerContext;
    use crate::error::DispatchError;
    use async_trait::async_trait;
    use cqrs_domain::messaging::{CommandMessage, Message, MessageKind};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Serialize, Deserialize)]
    struct Deposit {
        amount: i64,
    }

    impl Command for Deposit {
        const NAME: &'static str = "bank.Deposit";
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl CommandHandler<Deposit> for Recorder {
        async fn handle(&self, _ctx: &HandlerContext, command: Deposit) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(command.amount);
            Ok(())
        }
    }

    #[test]
    fn handled_types_matching() {
        assert!(HandledTypes::All.matches("anything"));
        assert!(HandledTypes::One("a".into()).matches("a"));
        assert!(!HandledTypes::One("a".into()).matches("b"));
        assert!(HandledTypes::Many(vec!["a".into(), "b".into()]).matches("b"));
    }

    #[tokio::test]
    async fn command_adapter_decodes_payload() {
        let adapter = CommandAdapter::new("deposit", Recorder::default());
        assert_eq!(adapter.kind(), MessageKind::Command);
        assert_eq!(adapter.handled_types(), HandledTypes::One("bank.Deposit".into()));

        let message = Message::from(Deposit { amount: 7 }.to_message().unwrap());
        let ctx = HandlerContext::new(&message, adapter.handler_name());
        adapter.handle(&ctx, &message).await.unwrap();
        assert_eq!(*adapter.handler.seen.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_payload_error() {
        let adapter = CommandAdapter::new("deposit", Recorder::default());
        let message = Message::from(
            CommandMessage::builder()
                .message_type("bank.Deposit")
                .payload(json!({ "amount": "lots" }))
                .build(),
        );
        let ctx = HandlerContext::new(&message, "deposit");

        let err = adapter.handle(&ctx, &message).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DispatchError>(),
            Some(DispatchError::Payload { .. })
        ));
    }
}
