use cqrs_domain::error::DomainError;
use cqrs_domain::messaging::MessageKind;
use cqrs_domain::retry::IsTransient;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("domain: {0}")]
    Domain(#[from] DomainError),

    #[error("handler not found: kind={kind}, message_type={message_type}")]
    HandlerNotFound {
        kind: MessageKind,
        message_type: String,
    },

    #[error("handler ambiguous: message_type={message_type}, handlers={handlers:?}")]
    HandlerAmbiguous {
        message_type: String,
        handlers: Vec<String>,
    },

    #[error("handler failed: handler={handler}, attempts={attempts}: {source}")]
    HandlerFailed {
        handler: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("payload: message_type={message_type}, reason={reason}")]
    Payload {
        message_type: String,
        reason: String,
    },

    #[error("handler already registered: handler={handler}")]
    AlreadyRegistered { handler: String },
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// 载荷错误与配置错误不会因重试而改变
impl IsTransient for DispatchError {
    fn is_transient(&self) -> bool {
        match self {
            DispatchError::Domain(err) => err.is_transient(),
            DispatchError::HandlerFailed { source, .. } => {
                match source.downcast_ref::<DispatchError>() {
                    Some(inner) => inner.is_transient(),
                    None => source.is_transient(),
                }
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DispatchError;
    use cqrs_domain::error::DomainError;
    use cqrs_domain::retry::IsTransient;

    fn failed(source: anyhow::Error) -> DispatchError {
        DispatchError::HandlerFailed {
            handler: "h".into(),
            attempts: 1,
            source,
        }
    }

    #[test]
    fn classification() {
        assert!(failed(anyhow::anyhow!("timeout")).is_transient());
        assert!(failed(DomainError::message_bus("down").into()).is_transient());
        assert!(!failed(
            DispatchError::Payload {
                message_type: "bank.Deposit".into(),
                reason: "missing field".into(),
            }
            .into()
        )
        .is_transient());
        assert!(!failed(DomainError::InvalidState { reason: "closed".into() }.into()).is_transient());
        assert!(
            !DispatchError::AlreadyRegistered {
                handler: "h".into()
            }
            .is_transient()
        );
    }
}
