//! 实体（Entity）基础抽象
//!
//! 为聚合状态提供统一的标识（Id）能力；版本由 `AggregateRoot` 维护。
//!
use std::{fmt::Display, str::FromStr};

/// 具备唯一标识的实体抽象
pub trait Entity: Send + Sync {
    /// 实体标识类型，要求可解析、可显示与可克隆
    type Id: FromStr + Clone + Display + Send + Sync;

    /// 使用给定标识创建实体（聚合的工厂函数）
    fn new(id: Self::Id) -> Self;

    /// 获取实体标识
    fn id(&self) -> &Self::Id;
}
