use cqrs_domain::messaging::{Message, MessageKind};

/// 处理器上下文（Handler Context）
///
/// 承载一次处理器调用所需的横切信息：
/// - 消息标识与类型码（幂等记录的组成部分）；
/// - 关联 ID，用于把处理器产生的事件批次关联回源头命令；
/// - 当前处理器名称与尝试序号，便于日志与审计。
///
/// 每个处理器每次尝试各持有一份，不在处理器之间共享。
#[derive(Clone, Debug)]
pub struct HandlerContext {
    pub message_id: String,
    pub message_type: String,
    pub kind: MessageKind,
    /// 关联 ID（保存聚合时传给 `Repository::save`）
    pub correlation_id: String,
    pub handler: String,
    /// 当前尝试序号，从 1 开始
    pub attempt: u32,
}

impl HandlerContext {
    pub fn new(message: &Message, handler: impl Into<String>) -> Self {
        Self {
            message_id: message.message_id().to_string(),
            message_type: message.message_type(),
            kind: message.kind(),
            correlation_id: message.correlation_id().to_string(),
            handler: handler.into(),
            attempt: 1,
        }
    }

    pub(crate) fn with_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }
}
