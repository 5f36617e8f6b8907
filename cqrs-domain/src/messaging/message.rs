//! 消息模型
//!
//! 运行时处理的四类消息：命令、单个领域事件、事件流（一个批次）与命令结果。
//! 每条消息带有稳定的类型码与 JSON 载荷，足以在消费端重建运行时类型。
//!
use crate::aggregate_key::AggregateKey;
use crate::domain_event::{EventBatch, SerializedEvent};
use crate::error::DomainResult;
use crate::value_object::Version;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// 消息种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    Command,
    Event,
    EventStream,
    Result,
}

impl MessageKind {
    pub const ALL: [MessageKind; 4] = [
        MessageKind::Command,
        MessageKind::Event,
        MessageKind::EventStream,
        MessageKind::Result,
    ];

    /// 是否允许多个处理器同时消费
    pub fn allows_fan_out(&self) -> bool {
        matches!(self, MessageKind::Event | MessageKind::EventStream)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Command => "command",
            MessageKind::Event => "event",
            MessageKind::EventStream => "event_stream",
            MessageKind::Result => "result",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct CommandMessage {
    #[builder(default = Uuid::new_v4().to_string(), into)]
    message_id: String,
    /// 命令类型码，形如 `bank.Deposit`
    #[builder(into)]
    message_type: String,
    /// 为空时取 `message_id`
    #[builder(into)]
    correlation_id: Option<String>,
    payload: Value,
    #[builder(default = Utc::now())]
    created_at: DateTime<Utc>,
}

impl CommandMessage {
    pub fn new<C: Serialize>(message_type: impl Into<String>, command: &C) -> DomainResult<Self> {
        Ok(Self::builder()
            .message_type(message_type)
            .payload(serde_json::to_value(command)?)
            .build())
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn correlation_id(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or(&self.message_id)
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn decode<C: DeserializeOwned>(&self) -> DomainResult<C> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// 单个领域事件消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    key: AggregateKey,
    version: Version,
    correlation_id: String,
    occurred_at: DateTime<Utc>,
    event: SerializedEvent,
}

impl EventMessage {
    pub fn new(
        key: AggregateKey,
        version: Version,
        correlation_id: impl Into<String>,
        event: SerializedEvent,
    ) -> Self {
        Self {
            key,
            version,
            correlation_id: correlation_id.into(),
            occurred_at: Utc::now(),
            event,
        }
    }

    /// 把批次拆成单个事件消息
    pub fn split(batch: &EventBatch) -> Vec<Self> {
        batch
            .events()
            .iter()
            .map(|event| Self {
                key: batch.key().clone(),
                version: batch.version(),
                correlation_id: batch.correlation_id().to_string(),
                occurred_at: batch.occurred_at(),
                event: event.clone(),
            })
            .collect()
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

    pub fn event(&self) -> &SerializedEvent {
        &self.event
    }
}

/// 命令执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    message_id: String,
    command_id: String,
    command_type: String,
    correlation_id: String,
    error: Option<String>,
    created_at: DateTime<Utc>,
}

impl CommandResult {
    pub fn succeeded(command: &CommandMessage) -> Self {
        Self::from_command(command, None)
    }

    pub fn failed(command: &CommandMessage, error: impl fmt::Display) -> Self {
        Self::from_command(command, Some(error.to_string()))
    }

    fn from_command(command: &CommandMessage, error: Option<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            command_id: command.message_id().to_string(),
            command_type: command.message_type().to_string(),
            correlation_id: command.correlation_id().to_string(),
            error,
            created_at: Utc::now(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    pub fn command_type(&self) -> &str {
        &self.command_type
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// 运行时消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Message {
    Command(CommandMessage),
    Event(EventMessage),
    EventStream(EventBatch),
    Result(CommandResult),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Command(_) => MessageKind::Command,
            Message::Event(_) => MessageKind::Event,
            Message::EventStream(_) => MessageKind::EventStream,
            Message::Result(_) => MessageKind::Result,
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            Message::Command(c) => c.message_id(),
            Message::Event(e) => e.event().event_id(),
            Message::EventStream(b) => b.batch_id(),
            Message::Result(r) => r.message_id(),
        }
    }

    /// 类型码：命令类型、事件类型、聚合限定类型名、或结果对应的命令类型
    pub fn message_type(&self) -> String {
        match self {
            Message::Command(c) => c.message_type().to_string(),
            Message::Event(e) => e.event().event_type().to_string(),
            Message::EventStream(b) => b.key().qualified_type(),
            Message::Result(r) => r.command_type().to_string(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Message::Command(c) => c.correlation_id(),
            Message::Event(e) => e.correlation_id(),
            Message::EventStream(b) => b.correlation_id(),
            Message::Result(r) => r.correlation_id(),
        }
    }
}

impl From<CommandMessage> for Message {
    fn from(value: CommandMessage) -> Self {
        Message::Command(value)
    }
}

impl From<EventMessage> for Message {
    fn from(value: EventMessage) -> Self {
        Message::Event(value)
    }
}

impl From<EventBatch> for Message {
    fn from(value: EventBatch) -> Self {
        Message::EventStream(value)
    }
}

impl From<CommandResult> for Message {
    fn from(value: CommandResult) -> Self {
        Message::Result(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandMessage, CommandResult, EventMessage, Message, MessageKind};
    use crate::aggregate_key::AggregateKey;
    use crate::domain_event::{EventBatch, SerializedEvent};
    use crate::value_object::Version;
    use serde_json::json;

    fn batch() -> EventBatch {
        let event = |n: i64| {
            SerializedEvent::builder()
                .event_type("AccountEvent.Deposited")
                .payload(json!({ "Deposited": { "amount": n } }))
                .build()
        };
        EventBatch::builder()
            .key(AggregateKey::new("Account", "bank", "a-1"))
            .version(Version::from_value(3))
            .correlation_id("cmd-9")
            .events(vec![event(1), event(2)])
            .build()
    }

    #[test]
    fn message_metadata_per_kind() {
        let cmd = CommandMessage::new("bank.Deposit", &json!({ "amount": 5 })).unwrap();
        let msg = Message::from(cmd.clone());
        assert_eq!(msg.kind(), MessageKind::Command);
        assert_eq!(msg.message_type(), "bank.Deposit");
        assert_eq!(msg.correlation_id(), cmd.message_id());

        let stream = Message::from(batch());
        assert_eq!(stream.kind(), MessageKind::EventStream);
        assert_eq!(stream.message_type(), "bank.Account");
        assert_eq!(stream.correlation_id(), "cmd-9");

        let result = Message::from(CommandResult::failed(&cmd, "boom"));
        assert_eq!(result.message_type(), "bank.Deposit");
        assert_eq!(result.correlation_id(), cmd.message_id());

        assert!(MessageKind::Event.allows_fan_out());
        assert!(!MessageKind::Command.allows_fan_out());
    }

    #[test]
    fn split_batch_keeps_order_and_version() {
        let messages = EventMessage::split(&batch());
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.version() == Version::from_value(3)));
        assert_eq!(messages[1].event().payload()["Deposited"]["amount"], 2);
    }

    #[test]
    fn message_serde_is_tagged_by_kind() {
        let msg = Message::from(batch());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], "event_stream");

        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }
}
