use cqrs_domain::error::DomainResult;
use cqrs_domain::messaging::CommandMessage;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// 应用层命令（Command）
///
/// 表达“意图”的写操作请求，通常会修改某个聚合的状态。
/// - 不返回业务数据，执行结果以 `CommandResult` 消息回传；
/// - 建议保持语义化的“动宾结构”命名，如 `OpenAccount`、`Deposit`。
///
/// 关联常量：
/// - `NAME`：命令的稳定类型码（如 `bank.Deposit`），用于路由、幂等记录与日志。
///   避免依赖 `type_name::<T>()`。
pub trait Command: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 命令的稳定类型码（建议常量字符串，不随重构变化）
    const NAME: &'static str;

    /// 封装为命令消息，关联 ID 取消息 ID
    fn to_message(&self) -> DomainResult<CommandMessage> {
        CommandMessage::new(Self::NAME, self)
    }

    /// 封装为命令消息并沿用上游的关联 ID
    fn to_correlated_message(&self, correlation_id: &str) -> DomainResult<CommandMessage> {
        Ok(CommandMessage::builder()
            .message_type(Self::NAME)
            .correlation_id(correlation_id)
            .payload(serde_json::to_value(self)?)
            .build())
    }
}
