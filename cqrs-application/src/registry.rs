//! 处理器注册表
//!
//! 按 `(消息种类, 类型码)` 索引调用链，订阅全部类型的处理器单独存放。
//! 解析结果按键缓存，注册新处理器时清空缓存。
//!
use crate::error::{DispatchError, DispatchResult as Result};
use crate::executor::Executor;
use crate::handler::HandledTypes;
use cqrs_domain::messaging::MessageKind;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

type Key = (MessageKind, String);

#[derive(Default)]
pub struct HandlerRegistry {
    by_type: DashMap<Key, Vec<Arc<Executor>>>,
    all: DashMap<MessageKind, Vec<Arc<Executor>>>,
    names: DashMap<String, MessageKind>,
    resolved: DashMap<Key, Arc<[Arc<Executor>]>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册调用链；处理器名称必须唯一
    pub fn register(&self, executor: Executor) -> Result<()> {
        let name = executor.name().to_string();
        let kind = executor.kind();
        match self.names.entry(name.clone()) {
            Entry::Occupied(_) => {
                return Err(DispatchError::AlreadyRegistered { handler: name });
            }
            Entry::Vacant(slot) => {
                slot.insert(kind);
            }
        }

        let executor = Arc::new(executor);
        match executor.handled_types().clone() {
            HandledTypes::All => self.all.entry(kind).or_default().push(executor),
            HandledTypes::One(t) => self.by_type.entry((kind, t)).or_default().push(executor),
            HandledTypes::Many(mut ts) => {
                ts.sort();
                ts.dedup();
                for t in ts {
                    self.by_type
                        .entry((kind, t))
                        .or_default()
                        .push(executor.clone());
                }
            }
        }
        self.resolved.clear();

        tracing::debug!(handler = %name, kind = %kind, "handler registered");
        Ok(())
    }

    /// 解析某条消息的全部处理器
    pub fn resolve(&self, kind: MessageKind, message_type: &str) -> Arc<[Arc<Executor>]> {
        let key = (kind, message_type.to_string());
        if let Some(hit) = self.resolved.get(&key) {
            return hit.clone();
        }

        let mut merged: Vec<Arc<Executor>> = Vec::new();
        if let Some(list) = self.by_type.get(&key) {
            merged.extend(list.iter().cloned());
        }
        if let Some(list) = self.all.get(&kind) {
            merged.extend(list.iter().cloned());
        }

        let merged: Arc<[Arc<Executor>]> = merged.into();
        self.resolved.insert(key, merged.clone());
        merged
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::HandlerRegistry;
    use crate::context::HandlerContext;
    use crate::error::DispatchError;
    use crate::executor::{Executor, TracingObserver};
    use crate::handler::{HandledTypes, MessageHandler};
    use crate::handler_record::InMemoryHandlerRecordStore;
    use async_trait::async_trait;
    use cqrs_domain::messaging::{Message, MessageKind};
    use cqrs_domain::retry::RetryConfig;
    use std::sync::Arc;

    struct Named {
        name: &'static str,
        kind: MessageKind,
        types: HandledTypes,
    }

    #[async_trait]
    impl MessageHandler for Named {
        fn handler_name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> MessageKind {
            self.kind
        }

        fn handled_types(&self) -> HandledTypes {
            self.types.clone()
        }

        async fn handle(&self, _: &HandlerContext, _: &Message) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn executor(name: &'static str, kind: MessageKind, types: HandledTypes) -> Executor {
        Executor::compose(
            Arc::new(Named { name, kind, types }),
            Arc::new(InMemoryHandlerRecordStore::default()),
            RetryConfig::none(),
            false,
            Arc::new(TracingObserver),
        )
    }

    fn names(registry: &HandlerRegistry, kind: MessageKind, t: &str) -> Vec<String> {
        let mut names: Vec<String> = registry
            .resolve(kind, t)
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn resolves_by_kind_and_type_plus_catch_all() {
        let registry = HandlerRegistry::new();
        registry
            .register(executor(
                "projector",
                MessageKind::Event,
                HandledTypes::Many(vec!["A.X".into(), "A.Y".into()]),
            ))
            .unwrap();
        registry
            .register(executor("audit", MessageKind::Event, HandledTypes::All))
            .unwrap();
        registry
            .register(executor("cmd", MessageKind::Command, HandledTypes::One("A.X".into())))
            .unwrap();

        assert_eq!(names(&registry, MessageKind::Event, "A.X"), vec!["audit", "projector"]);
        assert_eq!(names(&registry, MessageKind::Event, "A.Z"), vec!["audit"]);
        assert_eq!(names(&registry, MessageKind::Command, "A.X"), vec!["cmd"]);
        assert!(names(&registry, MessageKind::Result, "A.X").is_empty());
    }

    #[test]
    fn later_registration_invalidates_cache() {
        let registry = HandlerRegistry::new();
        assert!(registry.resolve(MessageKind::Event, "A.X").is_empty());

        registry
            .register(executor("audit", MessageKind::Event, HandledTypes::All))
            .unwrap();
        assert_eq!(registry.resolve(MessageKind::Event, "A.X").len(), 1);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = HandlerRegistry::new();
        registry
            .register(executor("audit", MessageKind::Event, HandledTypes::All))
            .unwrap();
        let err = registry
            .register(executor("audit", MessageKind::Result, HandledTypes::All))
            .unwrap_err();
        assert!(matches!(err, DispatchError::AlreadyRegistered { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn repeated_type_codes_register_once() {
        let registry = HandlerRegistry::new();
        registry
            .register(executor(
                "deposit",
                MessageKind::Command,
                HandledTypes::Many(vec!["A.X".into(), "A.X".into()]),
            ))
            .unwrap();
        assert_eq!(names(&registry, MessageKind::Command, "A.X"), vec!["deposit"]);
    }
}
